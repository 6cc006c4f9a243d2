//! Unclaimed band names
//!
//! Ingests the Google Books 1-gram corpus into a word frequency table, then
//! walks the most frequent words and checks each against an authority
//! service (Spotify artist search) to find the ones no band has claimed.
//!
//! ## Pipeline
//!
//! ```text
//! corpus shard (.gz) -> ShardReader -> FrequencyAggregator -> FrequencyWriter -> NameStore
//!                                                                                  |
//!                  CandidateGenerator <- EntityResolver <- AuthorityService <------+
//! ```
//!
//! ## Features
//!
//! - `database`: Postgres store (sqlx) and migrations
//! - `server`: axum HTTP trigger endpoints
//! - `cli`: the `unclaimed-names` binary

pub mod authority;
pub mod candidates;
pub mod config;
pub mod corpus;
pub mod error;
pub mod ingest;
pub mod resolver;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

pub use candidates::{CandidateGenerator, GenerationReport};
pub use config::AppConfig;
pub use error::{
    AuthorityError, FetchError, IngestError, ParseError, ResolveError, StoreError,
};
pub use ingest::{IngestReport, Ingestor};
pub use resolver::EntityResolver;
pub use store::{MemoryStore, NameStore};
