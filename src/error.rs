//! Error types for corpus ingestion and candidate generation
//!
//! Each stage surfaces its own error enum so callers can tell a transient
//! remote failure apart from a storage failure. Malformed corpus lines are
//! never errors; they are counted and skipped by the parser and aggregator.

use std::path::PathBuf;

use thiserror::Error;

/// Why a shard download failed
#[derive(Error, Debug)]
pub enum FetchCause {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("download stalled: no data for {0:?}")]
    Stalled(std::time::Duration),
}

/// Corpus fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch failed for shard '{shard}': {source}")]
    FetchFailed {
        shard: String,
        #[source]
        source: FetchCause,
    },
}

impl FetchError {
    pub fn failed(shard: &str, source: impl Into<FetchCause>) -> Self {
        FetchError::FetchFailed {
            shard: shard.to_string(),
            source: source.into(),
        }
    }
}

/// Errors raised while streaming a local shard
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read shard {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from a single ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("persistence failed for shard '{shard}' at batch {batch}: {source}")]
    PersistenceFailed {
        shard: String,
        batch: usize,
        #[source]
        source: StoreError,
    },

    #[error("failed to record completion of shard '{shard}': {source}")]
    Marker {
        shard: String,
        #[source]
        source: StoreError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("aggregation task aborted: {0}")]
    Aborted(String),
}

/// Errors from the external authority service
#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("authority credentials not configured")]
    NotConfigured,

    #[error("authentication with authority service failed: {0}")]
    AuthFailed(String),

    #[error("rate limited by authority service (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authority service error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode authority response: {0}")]
    Decode(String),
}

/// Errors from resolving one candidate name
///
/// Kept separate from `Ok(None)`: a failed lookup says nothing about whether
/// an entity exists.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("resolution failed: {0}")]
    Authority(#[from] AuthorityError),

    #[error("resolution failed: {0}")]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;
