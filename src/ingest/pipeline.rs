//! Shard-by-shard ingestion
//!
//! For each configured shard, in order:
//! 1. Skip it if its completion marker exists (no writes at all)
//! 2. Download it if not present locally
//! 3. Stream and aggregate it on a blocking thread
//! 4. Commit the aggregate in batches
//! 5. Write the completion marker
//!
//! Any failure stops the run before step 5 for the failing shard. Shards
//! completed earlier keep their markers, so a rerun resumes where it broke.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::writer::FrequencyWriter;
use crate::config::IngestConfig;
use crate::corpus::{aggregate_shard, AggregateStats, CorpusFetcher};
use crate::error::IngestError;
use crate::store::NameStore;

/// What happened to one shard during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ShardOutcome {
    /// Marker already present
    Skipped { shard: String, filename: String },
    Processed {
        shard: String,
        filename: String,
        lines_read: u64,
        skipped_lines: u64,
        distinct_words: usize,
        committed: u64,
        truncated: bool,
    },
}

impl ShardOutcome {
    fn processed(shard: &str, filename: String, stats: &AggregateStats, committed: u64) -> Self {
        ShardOutcome::Processed {
            shard: shard.to_string(),
            filename,
            lines_read: stats.lines_read,
            skipped_lines: stats.skipped_lines(),
            distinct_words: stats.distinct_words,
            committed,
            truncated: stats.truncated,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub shards: Vec<ShardOutcome>,
}

impl IngestReport {
    pub fn committed(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| match s {
                ShardOutcome::Processed { committed, .. } => *committed,
                ShardOutcome::Skipped { .. } => 0,
            })
            .sum()
    }
}

pub struct Ingestor {
    fetcher: CorpusFetcher,
    store: Arc<dyn NameStore>,
    writer: FrequencyWriter,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(fetcher: CorpusFetcher, store: Arc<dyn NameStore>, config: IngestConfig) -> Self {
        let writer = FrequencyWriter::new(store.clone(), config.batch_size);
        Self {
            fetcher,
            store,
            writer,
            config,
        }
    }

    /// Ingest every configured shard with the given threshold.
    pub async fn run(&self, min_frequency: u64) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        for shard in &self.fetcher.config().shards {
            match self.process_shard(shard, min_frequency).await {
                Ok(outcome) => report.shards.push(outcome),
                Err(e) => {
                    error!(shard = %shard, error = %e, "Shard ingestion failed");
                    return Err(e);
                }
            }
        }

        info!(
            shards = report.shards.len(),
            committed = report.committed(),
            "Ingestion complete"
        );
        Ok(report)
    }

    /// Ingest with the configured default threshold.
    pub async fn run_default(&self) -> Result<IngestReport, IngestError> {
        self.run(self.config.min_frequency).await
    }

    pub async fn process_shard(
        &self,
        shard: &str,
        min_frequency: u64,
    ) -> Result<ShardOutcome, IngestError> {
        let filename = self.fetcher.config().shard_name(shard);

        if self.store.is_shard_processed(&filename).await? {
            info!(shard, filename = %filename, "Shard already processed, skipping");
            return Ok(ShardOutcome::Skipped {
                shard: shard.to_string(),
                filename,
            });
        }

        let path = self.fetcher.fetch_shard(shard).await?;

        let max_new_entries = self.config.max_new_entries;
        let shard_path = path.clone();
        let aggregation = match tokio::task::spawn_blocking(move || {
            aggregate_shard(&shard_path, min_frequency, max_new_entries)
        })
        .await
        .map_err(|e| IngestError::Aborted(e.to_string()))?
        {
            Ok(aggregation) => aggregation,
            Err(e) => {
                // An unreadable shard is a corrupt or truncated download; drop
                // it so the next run fetches it again.
                warn!(shard, path = %path.display(), error = %e, "Discarding unreadable shard");
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    warn!(shard, error = %remove, "Failed to remove unreadable shard");
                }
                return Err(e.into());
            }
        };

        let committed = self
            .writer
            .commit_batch(&aggregation.records)
            .await
            .map_err(|failure| {
                warn!(
                    shard,
                    batch = failure.batch,
                    committed = failure.committed,
                    "Batch commit failed, shard left unmarked"
                );
                IngestError::PersistenceFailed {
                    shard: shard.to_string(),
                    batch: failure.batch,
                    source: failure.source,
                }
            })?;

        self.store
            .mark_shard_processed(&filename, Utc::now())
            .await
            .map_err(|source| IngestError::Marker {
                shard: shard.to_string(),
                source,
            })?;

        info!(
            shard,
            filename = %filename,
            committed,
            batches = aggregation.records.len().div_ceil(self.writer.batch_size()),
            "Shard committed and marked"
        );

        Ok(ShardOutcome::processed(
            shard,
            filename,
            &aggregation.stats,
            committed,
        ))
    }
}
