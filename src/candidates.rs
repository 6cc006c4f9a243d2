//! Candidate name generation
//!
//! Walks the most frequent words that are not yet claimed by a known entity
//! nor already rejected, asks the resolver about each, and records the ones
//! nobody has taken.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::resolver::EntityResolver;
use crate::store::{Entity, NameStore, ARTICLE_PREFIX};

/// Outcome of one generation pass, in selection order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct GenerationReport {
    /// Words with no matching entity, now recorded as candidates
    pub rejected: Vec<String>,
    /// Words that turned out to be claimed
    pub confirmed: Vec<Entity>,
    /// Words whose evaluation failed; still eligible next pass
    pub failed: Vec<String>,
}

pub struct CandidateGenerator {
    store: Arc<dyn NameStore>,
    resolver: Arc<EntityResolver>,
}

impl CandidateGenerator {
    pub fn new(store: Arc<dyn NameStore>, resolver: Arc<EntityResolver>) -> Self {
        Self { store, resolver }
    }

    /// Evaluate up to `limit` unclaimed words.
    ///
    /// Only the selection query can fail the pass. A word whose resolution
    /// or candidate insert fails is logged and left untouched.
    pub async fn run(&self, limit: usize) -> Result<GenerationReport, StoreError> {
        let selected = self.store.select_unclaimed_words(limit).await?;
        info!(limit, selected = selected.len(), "Evaluating candidate words");

        let mut report = GenerationReport::default();
        for record in selected {
            let word = record.word;
            let aliases = [word.clone(), format!("{ARTICLE_PREFIX}{word}")];

            match self.resolver.resolve(&word, &aliases).await {
                Ok(Some(entity)) => {
                    debug!(word = %word, entity = %entity.name, "Word already claimed");
                    report.confirmed.push(entity);
                }
                Ok(None) => match self.store.insert_candidate(&word).await {
                    Ok(_) => {
                        debug!(word = %word, "+ candidate");
                        report.rejected.push(word);
                    }
                    Err(e) => {
                        warn!(word = %word, error = %e, "Failed to record candidate");
                        report.failed.push(word);
                    }
                },
                Err(e) => {
                    warn!(word = %word, error = %e, "Resolution failed, skipping");
                    report.failed.push(word);
                }
            }
        }

        info!(
            rejected = report.rejected.len(),
            confirmed = report.confirmed.len(),
            failed = report.failed.len(),
            "Candidate generation complete"
        );
        Ok(report)
    }

    /// Newly rejected words only.
    pub async fn generate_candidates(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        Ok(self.run(limit).await?.rejected)
    }
}
