//! Preview audio fetching.
//!
//! Downloads the short preview clip for a track, enforcing a request
//! timeout and a hard size cap so one oversized response cannot stall or
//! balloon an analysis run.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The preview URL no longer resolves to audio.
    #[error("preview no longer available")]
    NotFound,
    #[error("preview fetch timed out")]
    Timeout,
    #[error("preview exceeds the {max_bytes} byte limit")]
    TooLarge { max_bytes: u64 },
    #[error("{0}")]
    Upstream(String),
}

/// Fetches preview audio bytes for a preview reference.
#[async_trait]
pub trait PreviewFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `PreviewFetcher` over plain HTTP GET.
pub struct HttpPreviewFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpPreviewFetcher {
    /// Create a fetcher with a per-request timeout and a response size cap.
    pub fn new(timeout_secs: u64, max_bytes: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, max_bytes }
    }

    /// Maximum response size in bytes before a fetch is aborted.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

#[async_trait]
impl PreviewFetcher for HttpPreviewFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Upstream(format!(
                "preview endpoint returned status {status}"
            )));
        }

        // Reject oversized responses up front when the server declares a
        // length, otherwise enforce the cap while streaming.
        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(FetchError::TooLarge {
                    max_bytes: self.max_bytes,
                });
            }
        }

        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_transport_error)?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    max_bytes: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} preview bytes from {}", body.len(), url);
        Ok(body)
    }
}

fn map_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Upstream(e.to_string())
    }
}
