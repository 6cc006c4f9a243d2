//! External authority service (entity search and popularity ranking)
//!
//! This module provides:
//! - The [`AuthorityService`] capability consumed by the resolver
//! - A Spotify-backed implementation
//! - The shared access-token cache

pub mod client;
pub mod token;
pub mod types;

use async_trait::async_trait;

pub use client::SpotifyClient;
pub use token::TokenCache;
pub use types::{AuthorityMatch, IssuedToken};

use crate::error::AuthorityError;

/// Name-based entity search with popularity ranking.
///
/// Anything that can issue a bearer token and search by free text fits here;
/// tests plug in canned responses.
#[async_trait]
pub trait AuthorityService: Send + Sync {
    /// Obtain a fresh access token and its lifetime.
    async fn issue_token(&self) -> Result<IssuedToken, AuthorityError>;

    /// Search entities by name, returning at most `limit` ranked hits.
    async fn search(
        &self,
        token: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<AuthorityMatch>, AuthorityError>;
}
