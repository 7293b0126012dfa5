//! Model data retrieval - a bounded worker pool over the run's download plan

pub mod http;

use crate::core::{DownloadItem, RunConfig};
use async_trait::async_trait;
use futures::future::join_all;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub use http::HttpDownloader;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{failed} of {total} model data file(s) could not be retrieved, first: {first}")]
    Incomplete {
        failed: usize,
        total: usize,
        first: String,
    },
}

/// Trait for retrieving one file - lets tests and debug runs stand in for HTTP
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, item: &DownloadItem) -> Result<(), FetchError>;
}

/// Logs what would be downloaded and writes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunDownloader;

#[async_trait]
impl Downloader for DryRunDownloader {
    async fn download(&self, item: &DownloadItem) -> Result<(), FetchError> {
        info!("Would download {} -> {}", item.url, item.destination.display());
        Ok(())
    }
}

/// Counts of one fetch pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub downloaded: usize,
    /// Already present on disk
    pub skipped: usize,
    /// `(url, error)` of every failed item
    pub failures: Vec<(String, String)>,
}

impl FetchReport {
    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failures.len()
    }

    /// Any failure fails the whole fetch
    pub fn into_result(self) -> Result<Self, FetchError> {
        match self.failures.first() {
            None => Ok(self),
            Some((url, error)) => Err(FetchError::Incomplete {
                failed: self.failures.len(),
                total: self.total(),
                first: format!("{} ({})", url, error),
            }),
        }
    }
}

enum ItemOutcome {
    Downloaded,
    Skipped,
    Failed(String, String),
}

/// Files to fetch and how many may be in flight at once
#[derive(Debug, Clone)]
pub struct FetchPlan {
    items: Vec<DownloadItem>,
    workers: usize,
}

impl FetchPlan {
    pub fn new(items: Vec<DownloadItem>, workers: usize) -> Self {
        Self {
            items,
            workers: workers.max(1),
        }
    }

    /// Every input file of the configured run, written to the model data directory
    pub fn from_config(config: &RunConfig) -> Self {
        let items = config.model_data.download_plan(
            config.start_time,
            config.end_time(),
            &config.model_data_dir(),
        );
        Self::new(items, config.fetch_workers)
    }

    pub fn items(&self) -> &[DownloadItem] {
        &self.items
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch every item, at most `workers` at a time. Waits for all workers
    /// before reporting; files already on disk are not fetched again.
    pub async fn run<D: Downloader + ?Sized>(
        &self,
        downloader: &D,
        progress: &ProgressBar,
    ) -> FetchReport {
        info!(
            "Fetching {} model data file(s) with {} worker(s)",
            self.items.len(),
            self.workers
        );
        progress.set_length(self.items.len() as u64);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let tasks = self.items.iter().map(|item| {
            let semaphore = semaphore.clone();
            async move {
                if item.destination.exists() {
                    debug!("{} already present", item.destination.display());
                    progress.inc(1);
                    return ItemOutcome::Skipped;
                }
                let Ok(_permit) = semaphore.acquire().await else {
                    return ItemOutcome::Failed(item.url.clone(), "worker pool closed".to_string());
                };

                let outcome = match downloader.download(item).await {
                    Ok(()) => {
                        debug!("Fetched {}", item.url);
                        ItemOutcome::Downloaded
                    }
                    Err(e) => {
                        warn!("Failed to fetch {}: {}", item.url, e);
                        ItemOutcome::Failed(item.url.clone(), e.to_string())
                    }
                };
                progress.inc(1);
                outcome
            }
        });

        let mut report = FetchReport::default();
        for outcome in join_all(tasks).await {
            match outcome {
                ItemOutcome::Downloaded => report.downloaded += 1,
                ItemOutcome::Skipped => report.skipped += 1,
                ItemOutcome::Failed(url, error) => report.failures.push((url, error)),
            }
        }
        progress.finish_and_clear();

        info!(
            "Fetch finished: {} downloaded, {} already present, {} failed",
            report.downloaded,
            report.skipped,
            report.failures.len()
        );
        report
    }
}
