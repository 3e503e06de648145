//! Fetch stage: bring the source archive into a private staging directory.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::HttpClient;
use crate::runtime::Runtime;

/// Default upper bound for a whole fetch, retries included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Store the resource behind `url` at `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Where an archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    Remote(Url),
    Local(PathBuf),
}

impl ArchiveSource {
    /// `http(s)://` is fetched over the network; `file://` URLs and plain paths are copied.
    pub fn parse(url: &str) -> Result<Self> {
        match Url::parse(url) {
            Ok(parsed) => match parsed.scheme() {
                "http" | "https" => Ok(ArchiveSource::Remote(parsed)),
                "file" => parsed
                    .to_file_path()
                    .map(ArchiveSource::Local)
                    .map_err(|_| anyhow!("'{}' is not a valid file URL", url)),
                // A Windows drive letter parses as a one-letter scheme
                scheme if scheme.len() == 1 => Ok(ArchiveSource::Local(PathBuf::from(url))),
                scheme => bail!("unsupported URL scheme '{}' in {}", scheme, url),
            },
            Err(_) => Ok(ArchiveSource::Local(PathBuf::from(url))),
        }
    }
}

/// Fetches archives over HTTP(S) with retries, or copies them from the local filesystem.
pub struct ArchiveFetcher<R: Runtime> {
    runtime: R,
    http_client: HttpClient,
    timeout: Duration,
}

impl<R: Runtime> ArchiveFetcher<R> {
    pub fn new(runtime: R, http_client: HttpClient) -> Self {
        Self {
            runtime,
            http_client,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_remote(&self, url: &Url, dest: &Path) -> Result<u64> {
        let dest = dest.to_path_buf();
        self.http_client
            .download_file(url.as_str(), || {
                self.runtime
                    .create_file(&dest)
                    .with_context(|| format!("Failed to create staging file at {:?}", dest))
            })
            .await
    }

    fn fetch_local(&self, path: &Path, dest: &Path) -> Result<u64> {
        if !self.runtime.exists(path) {
            bail!("{:?} does not exist", path);
        }
        self.runtime
            .copy(path, dest)
            .with_context(|| format!("Failed to copy {:?} into the staging directory", path))
    }
}

#[async_trait]
impl<R: Runtime> Fetcher for ArchiveFetcher<R> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let source = ArchiveSource::parse(url)?;
        info!("Fetching {}...", url);

        let bytes = match source {
            ArchiveSource::Remote(remote) => {
                tokio::time::timeout(self.timeout, self.fetch_remote(&remote, dest))
                    .await
                    .map_err(|_| {
                        anyhow!(
                            "timed out after {}s (raise it with --fetch-timeout)",
                            self.timeout.as_secs()
                        )
                    })??
            }
            ArchiveSource::Local(path) => self.fetch_local(&path, dest)?,
        };

        debug!("Fetched {} bytes into {:?}", bytes, dest);
        Ok(bytes)
    }
}
