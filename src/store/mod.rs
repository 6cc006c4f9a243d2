//! Durable state for word frequencies, shard markers, entities and
//! rejected candidates.
//!
//! Ingestion, resolution and candidate generation all go through
//! [`NameStore`], so the same pipeline runs against Postgres in production
//! and [`MemoryStore`] in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStore;

/// Prefix tried as an alias when matching words against entity names
pub const ARTICLE_PREFIX: &str = "the ";

/// Aggregated count for one normalized word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct FrequencyRecord {
    pub word: String,
    pub frequency: i32,
}

/// Completion marker for a fully committed shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct ShardMarker {
    pub filename: String,
    pub processed_at: DateTime<Utc>,
}

/// A confirmed, already-claimed name (a band)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Entity {
    pub id: i64,
    /// Display name; unique case-insensitively
    pub name: String,
    pub popularity: i32,
    /// Snapshot of the authority service's record
    pub external_data: serde_json::Value,
    pub last_updated: DateTime<Utc>,
}

/// Values written when an entity is created or refreshed
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpsert {
    pub name: String,
    pub popularity: i32,
    pub external_data: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

/// A word already evaluated and found unclaimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct CandidateRecord {
    pub word: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence trait for all pipeline state.
#[async_trait]
pub trait NameStore: Send + Sync {
    // ── Frequencies ──

    /// Apply one batch atomically. On conflict the stored frequency is
    /// replaced by the batch value. Returns the number of rows written.
    async fn upsert_frequencies(&self, batch: &[FrequencyRecord]) -> StoreResult<u64>;

    /// Highest-frequency words first, ties broken by word.
    async fn top_words(&self, limit: usize) -> StoreResult<Vec<FrequencyRecord>>;

    async fn frequency_of(&self, word: &str) -> StoreResult<Option<i32>>;

    // ── Shard markers ──

    async fn is_shard_processed(&self, filename: &str) -> StoreResult<bool>;

    /// Record a shard as complete. A second call for the same shard is a no-op.
    async fn mark_shard_processed(&self, filename: &str, at: DateTime<Utc>) -> StoreResult<()>;

    // ── Entities ──

    /// Case-insensitive lookup by name.
    async fn find_entity(&self, name: &str) -> StoreResult<Option<Entity>>;

    /// Create the entity, or refresh popularity, data and timestamp of the
    /// existing one whose name matches case-insensitively.
    async fn upsert_entity(&self, entity: &EntityUpsert) -> StoreResult<Entity>;

    // ── Candidates ──

    async fn has_candidate(&self, word: &str) -> StoreResult<bool>;

    /// Record a rejected word. Returns the existing record if already present.
    async fn insert_candidate(&self, word: &str) -> StoreResult<CandidateRecord>;

    async fn list_candidates(&self) -> StoreResult<Vec<CandidateRecord>>;

    // ── Selection ──

    /// Highest-frequency words that neither match an entity (directly or
    /// with the `"the "` prefix, case-insensitively) nor have a candidate
    /// record yet.
    async fn select_unclaimed_words(&self, limit: usize) -> StoreResult<Vec<FrequencyRecord>>;
}

/// Does `word` collide with `entity_name`, directly or as `"the " + word`?
pub fn word_claimed_by(word: &str, entity_name: &str) -> bool {
    let word = word.to_lowercase();
    let name = entity_name.to_lowercase();
    name == word
        || name
            .strip_prefix(ARTICLE_PREFIX)
            .is_some_and(|rest| rest == word)
}
