//! HTTP download of model data files

use super::{Downloader, FetchError};
use crate::core::DownloadItem;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Streams each file to `<destination>.part`, renamed into place once complete
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(600))
    }

    /// Per-request timeout; model files are large
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("wrf-pipeline/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn fetch_to(&self, url: &str, partial: &Path) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let io_error = |source: std::io::Error| FetchError::Io {
            path: partial.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(partial).await.map_err(io_error)?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(io_error)?;
        }
        file.flush().await.map_err(io_error)?;
        Ok(())
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, item: &DownloadItem) -> Result<(), FetchError> {
        let partial = partial_path(&item.destination);
        if let Err(e) = self.fetch_to(&item.url, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        tokio::fs::rename(&partial, &item.destination)
            .await
            .map_err(|source| FetchError::Io {
                path: item.destination.clone(),
                source,
            })
    }
}
