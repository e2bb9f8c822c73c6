//! Plain HTTP GET of provider-hosted result files
//!
//! Result URLs are pre-signed and short-lived, so no credentials are sent.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Budget for downloading one result file
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Remote file fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or body read failure
    #[error("failed to fetch {url}: {message}")]
    Network { url: String, message: String },

    /// Remote host answered with a non-success status
    #[error("failed to fetch {url}: status {status}")]
    Status { url: String, status: u16 },
}

/// Downloaded file contents
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Source of remote result files
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedFile, FetchError>;
}

/// `reqwest`-backed fetcher
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: format!("failed to create http client: {}", e),
            })?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFile, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.http_client.get(url).send().await.map_err(network)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(network)?.to_vec();

        debug!(url = %url, bytes = bytes.len(), "Fetched remote file");

        Ok(FetchedFile {
            bytes,
            content_type,
        })
    }
}
