//! Process configuration
//!
//! Everything is read from environment variables with sensible defaults.
//! Binaries call `dotenvy::dotenv()` first so a local `.env` file works.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_CORPUS_BASE_URL: &str = "http://storage.googleapis.com/books/ngrams/books";
pub const DEFAULT_CORPUS_DATASET: &str = "googlebooks-eng-all-1gram-20120701";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/unclaimed_names".to_string()),
            max_connections: env_parse("DATABASE_POOL_SIZE").unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Where the corpus lives, remotely and locally
#[derive(Debug, Clone)]
pub struct CorpusConfig {
    /// Remote directory holding the shards
    pub base_url: String,
    /// Shard file prefix, e.g. `googlebooks-eng-all-1gram-20120701`
    pub dataset: String,
    /// Shard identifiers, processed in order
    pub shards: Vec<String>,
    /// Local download directory
    pub data_dir: PathBuf,
    /// Connect timeout, and the longest wait for the next chunk of a body
    pub timeout: Duration,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CORPUS_BASE_URL.to_string(),
            dataset: DEFAULT_CORPUS_DATASET.to_string(),
            shards: vec!["a".to_string()],
            data_dir: PathBuf::from("data"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl CorpusConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("CORPUS_BASE_URL").unwrap_or(defaults.base_url),
            dataset: std::env::var("CORPUS_DATASET").unwrap_or(defaults.dataset),
            shards: std::env::var("CORPUS_SHARDS")
                .ok()
                .map(|s| parse_shard_list(&s))
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.shards),
            data_dir: std::env::var("CORPUS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            timeout: env_parse("CORPUS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Shard file name without extension; doubles as the completion marker key
    pub fn shard_name(&self, shard: &str) -> String {
        format!("{}-{}", self.dataset, shard)
    }

    pub fn shard_url(&self, shard: &str) -> String {
        format!(
            "{}/{}.gz",
            self.base_url.trim_end_matches('/'),
            self.shard_name(shard)
        )
    }

    pub fn shard_path(&self, shard: &str) -> PathBuf {
        self.data_dir.join(format!("{}.gz", self.shard_name(shard)))
    }
}

/// Batching and filtering knobs for ingestion
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub min_frequency: u64,
    /// Stop reading a shard once this many distinct words are held
    pub max_new_entries: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            min_frequency: 100,
            max_new_entries: None,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse("INGEST_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
            min_frequency: env_parse("INGEST_MIN_FREQUENCY").unwrap_or(defaults.min_frequency),
            max_new_entries: env_parse("INGEST_MAX_NEW_ENTRIES"),
        }
    }
}

/// Authority (Spotify) service settings
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: String,
    pub api_base: String,
    pub search_limit: usize,
    pub rate_limit: Duration,
    pub timeout: Duration,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            search_limit: 50, // maximum page size the search endpoint accepts
            rate_limit: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
        }
    }
}

impl AuthorityConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_id: non_empty_env("SPOTIFY_CLIENT_ID"),
            client_secret: non_empty_env("SPOTIFY_CLIENT_SECRET"),
            token_url: std::env::var("SPOTIFY_TOKEN_URL").unwrap_or(defaults.token_url),
            api_base: std::env::var("SPOTIFY_API_BASE").unwrap_or(defaults.api_base),
            search_limit: env_parse("AUTHORITY_SEARCH_LIMIT")
                .map(|n: usize| n.clamp(1, 50))
                .unwrap_or(defaults.search_limit),
            rate_limit: env_parse("AUTHORITY_RATE_LIMIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rate_limit),
            timeout: env_parse("HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub corpus: CorpusConfig,
    pub ingest: IngestConfig,
    pub authority: AuthorityConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            database: DatabaseConfig::default(),
            corpus: CorpusConfig::from_env(),
            ingest: IngestConfig::from_env(),
            authority: AuthorityConfig::from_env(),
        };

        url::Url::parse(&config.corpus.base_url).context("CORPUS_BASE_URL is not a valid URL")?;
        url::Url::parse(&config.authority.token_url)
            .context("SPOTIFY_TOKEN_URL is not a valid URL")?;
        url::Url::parse(&config.authority.api_base)
            .context("SPOTIFY_API_BASE is not a valid URL")?;

        Ok(config)
    }
}

fn parse_shard_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
