//! N-gram corpus handling
//!
//! - Fetcher: downloads shards into local storage
//! - Parser: streams `(word, count)` pairs out of a gzip shard
//! - Aggregator: sums, clamps and filters per-word counts for one shard

pub mod aggregator;
pub mod fetcher;
pub mod parser;

pub use aggregator::{aggregate, aggregate_shard, AggregateStats, Aggregation, FREQUENCY_CAP};
pub use fetcher::CorpusFetcher;
pub use parser::{is_valid_word, normalize_word, ParseStats, RawEntry, ShardReader};
