//! Batched frequency persistence
//!
//! Commits aggregated records in fixed-size chunks. Each chunk is one store
//! transaction; the first failing chunk stops the sequence and is reported
//! with its index so the caller can leave the shard unmarked.

use std::sync::Arc;

use tracing::debug;

use crate::error::StoreError;
use crate::store::{FrequencyRecord, NameStore};

/// A chunk that could not be committed
#[derive(Debug)]
pub struct BatchFailure {
    /// Zero-based index of the failing chunk
    pub batch: usize,
    /// Rows committed by earlier chunks
    pub committed: u64,
    pub source: StoreError,
}

pub struct FrequencyWriter {
    store: Arc<dyn NameStore>,
    batch_size: usize,
}

impl FrequencyWriter {
    pub fn new(store: Arc<dyn NameStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Upsert `records` chunk by chunk. Returns the total rows committed.
    pub async fn commit_batch(&self, records: &[FrequencyRecord]) -> Result<u64, BatchFailure> {
        let mut committed = 0u64;

        for (batch, chunk) in records.chunks(self.batch_size).enumerate() {
            match self.store.upsert_frequencies(chunk).await {
                Ok(rows) => {
                    committed += rows;
                    debug!(batch, rows, committed, "Committed frequency batch");
                }
                Err(source) => {
                    return Err(BatchFailure {
                        batch,
                        committed,
                        source,
                    })
                }
            }
        }

        Ok(committed)
    }
}
