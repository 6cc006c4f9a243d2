//! Spotify Web API client
//!
//! Rate-limited HTTP client for client-credentials token issuance and artist
//! search.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::types::{AuthorityMatch, IssuedToken, SearchResponse, TokenResponse};
use super::AuthorityService;
use crate::config::AuthorityConfig;
use crate::error::AuthorityError;

const ENTITY_TYPE: &str = "artist";

pub struct SpotifyClient {
    http: Client,
    config: AuthorityConfig,
    /// Start time reserved by the most recent request
    last_request: Mutex<Option<Instant>>,
}

impl SpotifyClient {
    pub fn new(config: AuthorityConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            config,
            last_request: Mutex::new(None),
        })
    }

    /// Enforce the minimum delay between requests.
    ///
    /// Each caller reserves its start slot under the lock, so concurrent
    /// callers queue up one interval apart.
    async fn rate_limit(&self) {
        let slot = {
            let mut last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let slot = match *last {
                Some(prev) => (prev + self.config.rate_limit).max(now),
                None => now,
            };
            *last = Some(slot);
            slot
        };

        sleep_until(slot).await;
    }

    fn credentials(&self) -> Result<(&str, &str), AuthorityError> {
        match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) => Ok((id.as_str(), secret.as_str())),
            _ => Err(AuthorityError::NotConfigured),
        }
    }
}

/// Map a non-success response onto the error taxonomy
async fn status_error(response: Response) -> AuthorityError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return AuthorityError::RateLimited { retry_after };
    }

    let body = response.text().await.unwrap_or_default();
    AuthorityError::Status {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    }
}

#[async_trait]
impl AuthorityService for SpotifyClient {
    async fn issue_token(&self) -> Result<IssuedToken, AuthorityError> {
        let (client_id, client_secret) = self.credentials()?;
        self.rate_limit().await;

        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AuthorityError::AuthFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::BAD_REQUEST
        {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Authority token request rejected");
            return Err(AuthorityError::AuthFailed(format!(
                "{}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthorityError::Decode(e.to_string()))?;

        Ok(IssuedToken {
            access_token: token.access_token,
            expires_in: Duration::from_secs(token.expires_in),
        })
    }

    async fn search(
        &self,
        token: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<AuthorityMatch>, AuthorityError> {
        self.rate_limit().await;

        let url = format!("{}/search", self.config.api_base.trim_end_matches('/'));
        let limit = limit.clamp(1, 50).to_string();
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("q", query), ("type", ENTITY_TYPE), ("limit", limit.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let page: SearchResponse = response
            .json()
            .await
            .map_err(|e| AuthorityError::Decode(e.to_string()))?;

        let matches = page
            .artists
            .items
            .into_iter()
            .filter_map(|item| match AuthorityMatch::from_artist(item) {
                Ok(m) => Some(m),
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable search item");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(query, hits = matches.len(), "Authority search complete");
        Ok(matches)
    }
}
