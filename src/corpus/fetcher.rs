//! Corpus shard downloader
//!
//! Streams a remote shard into `<dest>.part` and renames it over the final
//! path only after the body fully drains (and matches `Content-Length` when
//! the server sends one). A leftover `.part` file is discarded on the next
//! try. Bodies without a length can still end early; the ingestor removes a
//! shard that fails to decompress so it is fetched again.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::CorpusConfig;
use crate::error::{FetchCause, FetchError};

pub struct CorpusFetcher {
    client: Client,
    config: CorpusConfig,
}

impl CorpusFetcher {
    pub fn new(config: CorpusConfig) -> Result<Self> {
        // No overall timeout: shards are hundreds of megabytes. Stalls are
        // caught per chunk instead.
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    /// Download `shard` unless it is already present locally.
    pub async fn fetch_shard(&self, shard: &str) -> Result<PathBuf, FetchError> {
        fs::create_dir_all(&self.config.data_dir)
            .await
            .map_err(|e| FetchError::failed(shard, e))?;

        let dest = self.config.shard_path(shard);
        if fs::try_exists(&dest)
            .await
            .map_err(|e| FetchError::failed(shard, e))?
        {
            info!(shard, path = %dest.display(), "Shard already downloaded, skipping");
            return Ok(dest);
        }

        let part = partial_path(&dest);
        if let Err(e) = fs::remove_file(&part).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(FetchError::failed(shard, e));
            }
        } else {
            warn!(shard, path = %part.display(), "Discarded incomplete download");
        }

        let url = self.config.shard_url(shard);
        info!(shard, url = %url, "Downloading shard");
        let started = Instant::now();

        match self.download(&url, &part).await {
            Ok(bytes) => {
                fs::rename(&part, &dest)
                    .await
                    .map_err(|e| FetchError::failed(shard, e))?;
                info!(
                    shard,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Shard downloaded"
                );
                Ok(dest)
            }
            Err(cause) => {
                let _ = fs::remove_file(&part).await;
                warn!(shard, error = %cause, "Shard download failed");
                Err(FetchError::failed(shard, cause))
            }
        }
    }

    async fn download(&self, url: &str, part: &Path) -> Result<u64, FetchCause> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchCause::Status(status));
        }

        let expected = response.content_length();
        let mut file = fs::File::create(part).await?;
        let mut received: u64 = 0;

        let stall = self.config.timeout;
        while let Some(chunk) = timeout(stall, response.chunk())
            .await
            .map_err(|_| FetchCause::Stalled(stall))??
        {
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
        }

        if let Some(expected) = expected {
            if received != expected {
                return Err(FetchCause::Truncated { expected, received });
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        debug!(url, received, "Download stream drained");

        Ok(received)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("shard"));
    name.push(".part");
    dest.with_file_name(name)
}
