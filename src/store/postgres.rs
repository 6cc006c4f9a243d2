//! Postgres-backed store
//!
//! Schema lives in `migrations/`. Entity names are unique on `lower(name)`,
//! which is also the upsert conflict target.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info, warn};

use super::{
    CandidateRecord, Entity, EntityUpsert, FrequencyRecord, NameStore, ARTICLE_PREFIX,
};
use crate::config::DatabaseConfig;
use crate::error::StoreResult;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        info!(
            "Connecting to database: {}",
            mask_database_url(&config.database_url)
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                e
            })?;

        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Hide the password part of a connection URL for logging
fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        // Unparseable: keep only what follows the credentials, if anything
        Err(_) => match url.rsplit_once('@') {
            Some((_, host)) => format!("****@{host}"),
            None => "****".to_string(),
        },
    }
}

#[async_trait]
impl NameStore for PgStore {
    async fn upsert_frequencies(&self, batch: &[FrequencyRecord]) -> StoreResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let words: Vec<String> = batch.iter().map(|r| r.word.clone()).collect();
        let frequencies: Vec<i32> = batch.iter().map(|r| r.frequency).collect();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO word_frequencies (word, frequency)
            SELECT * FROM UNNEST($1::varchar[], $2::int4[])
            ON CONFLICT (word) DO UPDATE SET frequency = EXCLUDED.frequency
            "#,
        )
        .bind(words)
        .bind(frequencies)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(rows = result.rows_affected(), "Upserted frequency batch");
        Ok(result.rows_affected())
    }

    async fn top_words(&self, limit: usize) -> StoreResult<Vec<FrequencyRecord>> {
        let records = sqlx::query_as::<_, FrequencyRecord>(
            r#"
            SELECT word, frequency
            FROM word_frequencies
            ORDER BY frequency DESC, word ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn frequency_of(&self, word: &str) -> StoreResult<Option<i32>> {
        let frequency: Option<(i32,)> =
            sqlx::query_as(r#"SELECT frequency FROM word_frequencies WHERE word = $1"#)
                .bind(word)
                .fetch_optional(&self.pool)
                .await?;

        Ok(frequency.map(|(f,)| f))
    }

    async fn is_shard_processed(&self, filename: &str) -> StoreResult<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"SELECT EXISTS (SELECT 1 FROM shard_markers WHERE filename = $1)"#,
        )
        .bind(filename)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    async fn mark_shard_processed(&self, filename: &str, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO shard_markers (filename, processed_at)
            VALUES ($1, $2)
            ON CONFLICT (filename) DO NOTHING
            "#,
        )
        .bind(filename)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_entity(&self, name: &str) -> StoreResult<Option<Entity>> {
        let entity = sqlx::query_as::<_, Entity>(
            r#"
            SELECT id, name, popularity, external_data, last_updated
            FROM entities
            WHERE lower(name) = lower($1)
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity)
    }

    async fn upsert_entity(&self, entity: &EntityUpsert) -> StoreResult<Entity> {
        let stored = sqlx::query_as::<_, Entity>(
            r#"
            INSERT INTO entities (name, popularity, external_data, last_updated)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ((lower(name))) DO UPDATE SET
                popularity = EXCLUDED.popularity,
                external_data = EXCLUDED.external_data,
                last_updated = EXCLUDED.last_updated
            RETURNING id, name, popularity, external_data, last_updated
            "#,
        )
        .bind(&entity.name)
        .bind(entity.popularity)
        .bind(&entity.external_data)
        .bind(entity.observed_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn has_candidate(&self, word: &str) -> StoreResult<bool> {
        let exists: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS (SELECT 1 FROM candidates WHERE word = $1)"#)
                .bind(word)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists.0)
    }

    async fn insert_candidate(&self, word: &str) -> StoreResult<CandidateRecord> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let record = sqlx::query_as::<_, CandidateRecord>(
            r#"
            INSERT INTO candidates (word)
            VALUES ($1)
            ON CONFLICT (word) DO UPDATE SET word = EXCLUDED.word
            RETURNING word, created_at
            "#,
        )
        .bind(word)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_candidates(&self) -> StoreResult<Vec<CandidateRecord>> {
        let records = sqlx::query_as::<_, CandidateRecord>(
            r#"SELECT word, created_at FROM candidates ORDER BY word"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn select_unclaimed_words(&self, limit: usize) -> StoreResult<Vec<FrequencyRecord>> {
        let records = sqlx::query_as::<_, FrequencyRecord>(
            r#"
            SELECT wf.word, wf.frequency
            FROM word_frequencies wf
            WHERE NOT EXISTS (
                SELECT 1 FROM entities e
                WHERE lower(e.name) = lower(wf.word)
                   OR lower(e.name) = $2 || lower(wf.word)
            )
            AND NOT EXISTS (
                SELECT 1 FROM candidates c WHERE c.word = wf.word
            )
            ORDER BY wf.frequency DESC, wf.word ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .bind(ARTICLE_PREFIX)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_database_url() {
        assert_eq!(
            mask_database_url("postgresql://app:secret@db:5432/names"),
            "postgresql://app:****@db:5432/names"
        );
        assert_eq!(
            mask_database_url("postgresql://localhost/names"),
            "postgresql://localhost/names"
        );
    }

    #[test]
    fn test_mask_unparseable_url() {
        let masked = mask_database_url("app:secret@db:5432/names");
        assert_eq!(masked, "****@db:5432/names");
        assert!(!masked.contains("secret"));
        assert_eq!(mask_database_url("not a url"), "****");
    }

    // Database-backed tests. Each gets a fresh database with migrations
    // applied. Run with:
    //   DATABASE_URL=postgresql://localhost/postgres cargo test -- --ignored

    fn record(word: &str, frequency: i32) -> FrequencyRecord {
        FrequencyRecord {
            word: word.to_string(),
            frequency,
        }
    }

    fn band(name: &str, popularity: i32) -> EntityUpsert {
        EntityUpsert {
            name: name.to_string(),
            popularity,
            external_data: serde_json::json!({ "name": name, "popularity": popularity }),
            observed_at: Utc::now(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_upsert_replaces_frequency(pool: PgPool) -> anyhow::Result<()> {
        let store = PgStore::new(pool);

        let written = store
            .upsert_frequencies(&[record("queen", 800), record("river", 50)])
            .await?;
        assert_eq!(written, 2);
        store.upsert_frequencies(&[record("queen", 300)]).await?;

        assert_eq!(store.frequency_of("queen").await?, Some(300));
        assert_eq!(store.frequency_of("river").await?, Some(50));
        assert_eq!(store.frequency_of("absent").await?, None);
        assert_eq!(store.upsert_frequencies(&[]).await?, 0);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_top_words_ordering(pool: PgPool) -> anyhow::Result<()> {
        let store = PgStore::new(pool);
        store
            .upsert_frequencies(&[record("b", 5), record("a", 5), record("c", 9)])
            .await?;

        let words: Vec<_> = store
            .top_words(10)
            .await?
            .into_iter()
            .map(|r| r.word)
            .collect();
        assert_eq!(words, vec!["c", "a", "b"]);
        assert_eq!(store.top_words(1).await?.len(), 1);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_marker_written_once(pool: PgPool) -> anyhow::Result<()> {
        let store = PgStore::new(pool);
        let first = Utc::now();

        store.mark_shard_processed("shard-a", first).await?;
        store.mark_shard_processed("shard-a", Utc::now()).await?;

        assert!(store.is_shard_processed("shard-a").await?);
        assert!(!store.is_shard_processed("shard-b").await?);
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shard_markers")
            .fetch_one(&store.pool)
            .await?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_entity_upsert_is_case_insensitive(pool: PgPool) -> anyhow::Result<()> {
        let store = PgStore::new(pool);

        let first = store.upsert_entity(&band("The Beatles", 90)).await?;
        let second = store.upsert_entity(&band("the beatles", 95)).await?;

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "The Beatles");
        assert_eq!(second.popularity, 95);
        assert_eq!(second.external_data["popularity"], 95);
        assert!(second.last_updated >= first.last_updated);

        let found = store.find_entity("THE BEATLES").await?.unwrap();
        assert_eq!(found.id, first.id);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_candidate_insert_returns_existing(pool: PgPool) -> anyhow::Result<()> {
        let store = PgStore::new(pool);

        let first = store.insert_candidate("zeppelin").await?;
        let second = store.insert_candidate("zeppelin").await?;

        assert_eq!(first, second);
        assert!(store.has_candidate("zeppelin").await?);
        assert!(!store.has_candidate("queen").await?);
        assert_eq!(store.list_candidates().await?.len(), 1);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_selection_excludes_entities_and_candidates(
        pool: PgPool,
    ) -> anyhow::Result<()> {
        let store = PgStore::new(pool);
        store
            .upsert_frequencies(&[
                record("zeppelin", 900),
                record("queen", 800),
                record("beatles", 700),
                record("tried", 600),
                record("open", 500),
                record("doors", 500),
            ])
            .await?;
        store.upsert_entity(&band("QUEEN", 80)).await?;
        store.upsert_entity(&band("The Beatles", 95)).await?;
        store.insert_candidate("tried").await?;

        let words: Vec<_> = store
            .select_unclaimed_words(10)
            .await?
            .into_iter()
            .map(|r| r.word)
            .collect();
        assert_eq!(words, vec!["zeppelin", "doors", "open"]);

        let limited = store.select_unclaimed_words(1).await?;
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].word, "zeppelin");
        Ok(())
    }
}
