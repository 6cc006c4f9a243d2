//! Entity resolution against the authority service
//!
//! Searches by the primary name, keeps hits whose name equals one of the
//! alias forms (case-insensitively), picks the most popular, and upserts it
//! as a known entity.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::authority::{AuthorityMatch, AuthorityService, TokenCache};
use crate::error::{AuthorityError, ResolveError};
use crate::store::{Entity, EntityUpsert, NameStore};

pub struct EntityResolver {
    authority: Arc<dyn AuthorityService>,
    tokens: TokenCache,
    store: Arc<dyn NameStore>,
    search_limit: usize,
}

impl EntityResolver {
    pub fn new(
        authority: Arc<dyn AuthorityService>,
        store: Arc<dyn NameStore>,
        search_limit: usize,
    ) -> Self {
        Self {
            authority,
            tokens: TokenCache::new(),
            store,
            search_limit: search_limit.max(1),
        }
    }

    /// Resolve `name`, accepting hits named like any of `aliases`.
    ///
    /// With no aliases, only an exact (case-insensitive) match on `name`
    /// counts. `Ok(None)` means the service answered and nothing matched.
    pub async fn resolve(
        &self,
        name: &str,
        aliases: &[String],
    ) -> Result<Option<Entity>, ResolveError> {
        let token = self
            .tokens
            .get_or_refresh(|| self.authority.issue_token())
            .await?;

        let hits = match self.authority.search(&token, name, self.search_limit).await {
            Ok(hits) => hits,
            Err(e) => {
                if matches!(e, AuthorityError::Status { status: 401, .. }) {
                    // Revoked before its advertised expiry.
                    self.tokens.invalidate().await;
                }
                return Err(e.into());
            }
        };

        let accepted: Vec<String> = if aliases.is_empty() {
            vec![name.to_lowercase()]
        } else {
            aliases.iter().map(|a| a.to_lowercase()).collect()
        };

        let Some(best) = most_popular_match(hits, &accepted) else {
            debug!(name, "No exact authority match");
            return Ok(None);
        };

        let entity = self
            .store
            .upsert_entity(&EntityUpsert {
                name: best.name,
                popularity: best.popularity,
                external_data: best.data,
                observed_at: Utc::now(),
            })
            .await?;

        info!(
            name,
            entity = %entity.name,
            popularity = entity.popularity,
            "Resolved known entity"
        );
        Ok(Some(entity))
    }

    /// Resolve a single name with no alternate forms.
    pub async fn resolve_name(&self, name: &str) -> Result<Option<Entity>, ResolveError> {
        self.resolve(name, &[]).await
    }
}

/// Highest-popularity hit whose lower-cased name is in `accepted`.
/// Ties keep the earliest hit.
fn most_popular_match(hits: Vec<AuthorityMatch>, accepted: &[String]) -> Option<AuthorityMatch> {
    hits.into_iter()
        .filter(|hit| accepted.contains(&hit.name.to_lowercase()))
        .fold(None, |best: Option<AuthorityMatch>, hit| match best {
            Some(current) if current.popularity >= hit.popularity => Some(current),
            _ => Some(hit),
        })
}
