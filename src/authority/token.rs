//! Shared access-token cache
//!
//! One token serves every resolution call until it expires. The slot is an
//! async mutex held across the refresh, so concurrent callers that find the
//! token stale wait for the single in-flight refresh instead of issuing
//! their own.

use std::future::Future;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::types::IssuedToken;
use crate::error::AuthorityError;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, or run `issue` to obtain a new one.
    pub async fn get_or_refresh<F, Fut>(&self, issue: F) -> Result<String, AuthorityError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedToken, AuthorityError>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(token) = slot.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }

        let issued = issue().await?;
        let cached = CachedToken {
            value: issued.access_token,
            expires_at: Instant::now() + issued.expires_in,
        };
        debug!(
            expires_in_secs = issued.expires_in.as_secs(),
            "Refreshed authority access token"
        );

        let value = cached.value.clone();
        *slot = Some(cached);
        Ok(value)
    }

    /// Drop the cached token so the next call re-issues.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
