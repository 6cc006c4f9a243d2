//! In-process store
//!
//! Same semantics as the Postgres store, held behind one mutex. Used by the
//! test suites and for dry runs without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    word_claimed_by, CandidateRecord, Entity, EntityUpsert, FrequencyRecord, NameStore,
};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    frequencies: HashMap<String, i32>,
    markers: BTreeMap<String, DateTime<Utc>>,
    entities: Vec<Entity>,
    candidates: BTreeMap<String, DateTime<Utc>>,
    next_entity_id: i64,
    writes: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total mutating calls that changed state (frequency rows, markers,
    /// entities, candidates).
    pub fn write_count(&self) -> u64 {
        self.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.lock()
            .map(|inner| inner.entities.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn ranked(records: impl Iterator<Item = FrequencyRecord>) -> Vec<FrequencyRecord> {
    let mut records: Vec<_> = records.collect();
    records.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.word.cmp(&b.word))
    });
    records
}

#[async_trait]
impl NameStore for MemoryStore {
    async fn upsert_frequencies(&self, batch: &[FrequencyRecord]) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        for record in batch {
            inner
                .frequencies
                .insert(record.word.clone(), record.frequency);
        }
        inner.writes += batch.len() as u64;
        Ok(batch.len() as u64)
    }

    async fn top_words(&self, limit: usize) -> StoreResult<Vec<FrequencyRecord>> {
        let inner = self.lock()?;
        let mut records = ranked(inner.frequencies.iter().map(|(word, frequency)| {
            FrequencyRecord {
                word: word.clone(),
                frequency: *frequency,
            }
        }));
        records.truncate(limit);
        Ok(records)
    }

    async fn frequency_of(&self, word: &str) -> StoreResult<Option<i32>> {
        Ok(self.lock()?.frequencies.get(word).copied())
    }

    async fn is_shard_processed(&self, filename: &str) -> StoreResult<bool> {
        Ok(self.lock()?.markers.contains_key(filename))
    }

    async fn mark_shard_processed(&self, filename: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if !inner.markers.contains_key(filename) {
            inner.markers.insert(filename.to_string(), at);
            inner.writes += 1;
        }
        Ok(())
    }

    async fn find_entity(&self, name: &str) -> StoreResult<Option<Entity>> {
        let needle = name.to_lowercase();
        Ok(self
            .lock()?
            .entities
            .iter()
            .find(|e| e.name.to_lowercase() == needle)
            .cloned())
    }

    async fn upsert_entity(&self, entity: &EntityUpsert) -> StoreResult<Entity> {
        let mut inner = self.lock()?;
        inner.writes += 1;

        let needle = entity.name.to_lowercase();
        if let Some(existing) = inner
            .entities
            .iter_mut()
            .find(|e| e.name.to_lowercase() == needle)
        {
            existing.popularity = entity.popularity;
            existing.external_data = entity.external_data.clone();
            existing.last_updated = entity.observed_at;
            return Ok(existing.clone());
        }

        inner.next_entity_id += 1;
        let created = Entity {
            id: inner.next_entity_id,
            name: entity.name.clone(),
            popularity: entity.popularity,
            external_data: entity.external_data.clone(),
            last_updated: entity.observed_at,
        };
        inner.entities.push(created.clone());
        Ok(created)
    }

    async fn has_candidate(&self, word: &str) -> StoreResult<bool> {
        Ok(self.lock()?.candidates.contains_key(word))
    }

    async fn insert_candidate(&self, word: &str) -> StoreResult<CandidateRecord> {
        let mut inner = self.lock()?;
        if let Some(created_at) = inner.candidates.get(word) {
            return Ok(CandidateRecord {
                word: word.to_string(),
                created_at: *created_at,
            });
        }

        let created_at = Utc::now();
        inner.candidates.insert(word.to_string(), created_at);
        inner.writes += 1;
        Ok(CandidateRecord {
            word: word.to_string(),
            created_at,
        })
    }

    async fn list_candidates(&self) -> StoreResult<Vec<CandidateRecord>> {
        Ok(self
            .lock()?
            .candidates
            .iter()
            .map(|(word, created_at)| CandidateRecord {
                word: word.clone(),
                created_at: *created_at,
            })
            .collect())
    }

    async fn select_unclaimed_words(&self, limit: usize) -> StoreResult<Vec<FrequencyRecord>> {
        let inner = self.lock()?;
        let unclaimed = inner
            .frequencies
            .iter()
            .filter(|(word, _)| !inner.candidates.contains_key(*word))
            .filter(|(word, _)| !inner.entities.iter().any(|e| word_claimed_by(word, &e.name)))
            .map(|(word, frequency)| FrequencyRecord {
                word: word.clone(),
                frequency: *frequency,
            });

        let mut records = ranked(unclaimed);
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            external_data: serde_json::json!({ "name": name }),
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_frequency() {
        let store = MemoryStore::new();
        store.upsert_frequencies(&[record("queen", 800)]).await.unwrap();
        store.upsert_frequencies(&[record("queen", 300)]).await.unwrap();
        assert_eq!(store.frequency_of("queen").await.unwrap(), Some(300));
    }

    #[tokio::test]
    async fn test_top_words_ordering() {
        let store = MemoryStore::new();
        store
            .upsert_frequencies(&[record("b", 5), record("a", 5), record("c", 9)])
            .await
            .unwrap();
        let words: Vec<_> = store
            .top_words(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.word)
            .collect();
        assert_eq!(words, vec!["c", "a", "b"]);
        assert_eq!(store.top_words(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_marker_written_once() {
        let store = MemoryStore::new();
        store.mark_shard_processed("shard-a", Utc::now()).await.unwrap();
        store.mark_shard_processed("shard-a", Utc::now()).await.unwrap();
        assert!(store.is_shard_processed("shard-a").await.unwrap());
        assert!(!store.is_shard_processed("shard-b").await.unwrap());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_entity_upsert_is_case_insensitive() {
        let store = MemoryStore::new();
        let first = store.upsert_entity(&band("The Beatles", 90)).await.unwrap();
        let second = store.upsert_entity(&band("the beatles", 95)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "The Beatles");
        assert_eq!(second.popularity, 95);
        assert_eq!(store.entities().len(), 1);
        assert!(store.find_entity("THE BEATLES").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_candidate_insert_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.insert_candidate("zeppelin").await.unwrap();
        let second = store.insert_candidate("zeppelin").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_candidates().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_selection_excludes_entities_and_candidates() {
        let store = MemoryStore::new();
        store
            .upsert_frequencies(&[
                record("zeppelin", 900),
                record("queen", 800),
                record("beatles", 700),
                record("tried", 600),
                record("open", 500),
            ])
            .await
            .unwrap();
        store.upsert_entity(&band("Queen", 80)).await.unwrap();
        store.upsert_entity(&band("The Beatles", 95)).await.unwrap();
        store.insert_candidate("tried").await.unwrap();

        let words: Vec<_> = store
            .select_unclaimed_words(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.word)
            .collect();
        assert_eq!(words, vec!["zeppelin", "open"]);
    }
}
