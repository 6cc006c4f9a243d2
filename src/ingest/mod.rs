//! Corpus ingestion: fetch, aggregate, commit, mark

pub mod pipeline;
pub mod writer;

pub use pipeline::{IngestReport, Ingestor, ShardOutcome};
pub use writer::{BatchFailure, FrequencyWriter};
