//! Image fetcher
//!
//! This module handles the out-of-band image downloads of detail pages:
//! - Building the HTTP client with the browser's user agent
//! - Fetching bytes by URL (`ByteFetcher`)
//! - Fixed-count retry with a fixed delay
//! - Saving under `<unit_id>.<ext>` in the image directory

use crate::config::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Extensions kept from the image URL; anything else is saved as `jpg`
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

const DEFAULT_EXTENSION: &str = "jpg";

/// Errors raised while downloading an image
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to save image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not an http(s) URL: {0}")]
    InvalidUrl(String),

    #[error("Giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

/// Fetches raw bytes by URL
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Builds the HTTP client used for image downloads
///
/// # Arguments
///
/// * `user_agent` - Sent with every request, same as the browser's
/// * `timeout` - Whole-request timeout
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `ByteFetcher` over a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Downloads detail-page images into one directory
#[derive(Clone)]
pub struct ImageFetcher {
    fetcher: Arc<dyn ByteFetcher>,
    policy: RetryPolicy,
    directory: PathBuf,
}

impl ImageFetcher {
    pub fn new(fetcher: Arc<dyn ByteFetcher>, policy: RetryPolicy, directory: PathBuf) -> Self {
        Self {
            fetcher,
            policy,
            directory,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Downloads `url` and saves it as `<unit_id>.<ext>`
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Where the image was written
    /// * `Err(FetchError)` - Invalid URL, exhausted retries or write failure
    pub async fn download(&self, url: &str, unit_id: u64) -> Result<PathBuf, FetchError> {
        if !is_http_url(url) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let bytes = self.fetch_with_retry(url, unit_id).await?;

        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(image_file_name(url, unit_id));
        tokio::fs::write(&path, &bytes).await?;

        tracing::debug!("Saved image for unit {} to {}", unit_id, path.display());
        Ok(path)
    }

    async fn fetch_with_retry(&self, url: &str, unit_id: u64) -> Result<Vec<u8>, FetchError> {
        let attempts = self.policy.attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match self.fetcher.get(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::warn!(
                        "Image download failed for unit {} (attempt {}/{}): {}",
                        unit_id,
                        attempt,
                        attempts,
                        e
                    );
                    last = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last,
        })
    }
}

/// Returns true for absolute http and https URLs
pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// `<unit_id>.<ext>`, with the extension taken from the URL path when known
pub fn image_file_name(url: &str, unit_id: u64) -> String {
    let extension = ::url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            let path = parsed.path().to_string();
            path.rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    format!("{}.{}", unit_id, extension)
}
