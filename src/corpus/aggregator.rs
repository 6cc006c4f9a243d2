//! Per-shard frequency aggregation
//!
//! Sums counts per lower-cased word for one shard, saturating at
//! [`FREQUENCY_CAP`], then keeps only words whose total reaches the
//! minimum frequency. The map lives for one run and is never shared.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use super::parser::{is_valid_word, normalize_word, ParseStats, RawEntry, ShardReader};
use crate::error::ParseError;
use crate::store::FrequencyRecord;

/// Largest frequency the store can hold (32-bit signed column).
pub const FREQUENCY_CAP: i32 = i32::MAX;

/// Counters for one aggregation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub lines_read: u64,
    pub malformed_lines: u64,
    pub invalid_words: u64,
    pub invalid_counts: u64,
    pub distinct_words: usize,
    pub kept_words: usize,
    /// Reading stopped early because `max_new_entries` was reached
    pub truncated: bool,
}

impl AggregateStats {
    /// Lines that contributed nothing, whatever the reason
    pub fn skipped_lines(&self) -> u64 {
        self.malformed_lines + self.invalid_words + self.invalid_counts
    }
}

/// Result of aggregating one shard
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Filtered entries, sorted by word
    pub records: Vec<FrequencyRecord>,
    pub stats: AggregateStats,
}

pub struct FrequencyAggregator {
    counts: HashMap<String, u64>,
    max_new_entries: Option<usize>,
    stats: AggregateStats,
}

impl FrequencyAggregator {
    pub fn new(max_new_entries: Option<usize>) -> Self {
        Self {
            counts: HashMap::new(),
            max_new_entries,
            stats: AggregateStats::default(),
        }
    }

    /// Fold one raw pair into the running totals.
    ///
    /// Returns `false` once the distinct-word cap is hit; the caller should
    /// stop feeding entries.
    pub fn observe(&mut self, word: &str, raw_count: &str) -> bool {
        if !is_valid_word(word) {
            self.stats.invalid_words += 1;
            return true;
        }
        let Some(count) = parse_count(raw_count) else {
            self.stats.invalid_counts += 1;
            return true;
        };

        let key = normalize_word(word);
        if let Some(total) = self.counts.get_mut(&key) {
            *total = clamp(total.saturating_add(count));
            return true;
        }

        if let Some(max) = self.max_new_entries {
            if self.counts.len() >= max {
                self.stats.truncated = true;
                return false;
            }
        }
        self.counts.insert(key, clamp(count));
        true
    }

    /// Drop words below `min_frequency` and return the rest, sorted by word.
    pub fn finish(mut self, min_frequency: u64) -> Aggregation {
        self.stats.distinct_words = self.counts.len();

        let mut records: Vec<FrequencyRecord> = self
            .counts
            .into_iter()
            .filter(|(_, total)| *total >= min_frequency)
            .map(|(word, total)| FrequencyRecord {
                word,
                frequency: i32::try_from(total).unwrap_or(FREQUENCY_CAP),
            })
            .collect();
        records.sort_by(|a, b| a.word.cmp(&b.word));

        self.stats.kept_words = records.len();
        Aggregation {
            records,
            stats: self.stats,
        }
    }

    fn absorb_parse_stats(&mut self, parse: ParseStats) {
        self.stats.lines_read = parse.lines_read;
        self.stats.malformed_lines = parse.malformed_lines;
    }
}

/// Parse a raw count. Digit strings too long for `u64` saturate; they are
/// clamped to the cap like any other oversized total.
fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.parse::<u64>() {
        Ok(count) => Some(count),
        Err(_) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => Some(u64::MAX),
        Err(_) => None,
    }
}

fn clamp(total: u64) -> u64 {
    total.min(FREQUENCY_CAP as u64)
}

/// Aggregate any stream of raw entries.
pub fn aggregate<I>(
    entries: I,
    min_frequency: u64,
    max_new_entries: Option<usize>,
) -> Result<Aggregation, ParseError>
where
    I: IntoIterator<Item = Result<RawEntry, ParseError>>,
{
    let mut aggregator = FrequencyAggregator::new(max_new_entries);
    for entry in entries {
        let entry = entry?;
        aggregator.stats.lines_read += 1;
        if !aggregator.observe(&entry.word, &entry.count) {
            break;
        }
    }
    Ok(aggregator.finish(min_frequency))
}

/// Open, stream and aggregate a gzip shard from disk.
///
/// Blocking; run it off the async executor.
pub fn aggregate_shard(
    path: &Path,
    min_frequency: u64,
    max_new_entries: Option<usize>,
) -> Result<Aggregation, ParseError> {
    let mut reader = ShardReader::open(path)?;
    let mut aggregator = FrequencyAggregator::new(max_new_entries);

    for entry in reader.by_ref() {
        let entry = entry?;
        if !aggregator.observe(&entry.word, &entry.count) {
            debug!(path = %path.display(), "Distinct word cap reached, stopping early");
            break;
        }
    }
    aggregator.absorb_parse_stats(reader.stats());

    let aggregation = aggregator.finish(min_frequency);
    let stats = &aggregation.stats;
    info!(
        path = %path.display(),
        lines = stats.lines_read,
        malformed = stats.malformed_lines,
        invalid_words = stats.invalid_words,
        invalid_counts = stats.invalid_counts,
        distinct = stats.distinct_words,
        kept = stats.kept_words,
        truncated = stats.truncated,
        "Shard aggregated"
    );
    Ok(aggregation)
}
