//! HTTP transport used for listings and file downloads
//!
//! The pipeline only needs two capabilities from the network: fetch a
//! resource into memory and stream a resource to disk. [`HttpTransport`]
//! is the seam; [`ReqwestTransport`] is the production implementation with
//! timeouts and retry, and tests substitute scripted transports.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::IngestConfig;

/// Base delay between retry attempts; multiplied by the attempt number
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("IO error writing download: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Whether a retry has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Status { status, .. } => *status >= 500 || *status == 429,
            HttpError::Transport { .. } => true,
            HttpError::Io(_) => false,
        }
    }
}

/// A fetched resource
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Fetch a URL into memory. Non-success statuses are errors.
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError>;

    /// Stream a URL to `dest`, returning bytes written
    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, HttpError> {
        let response = self.get(url).await?;
        tokio::fs::write(dest, &response.body).await?;
        Ok(response.body.len() as u64)
    }
}

/// reqwest-backed transport with per-request timeout and linear backoff
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    max_retries: u32,
}

impl ReqwestTransport {
    pub fn new(config: &IngestConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HttpError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            max_retries: config.http_max_retries.max(1),
        })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, HttpError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out
    async fn with_retry<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, HttpError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, HttpError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = RETRY_DELAY * attempt;
                    warn!(
                        url = %url,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Request failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.with_retry(url, || async {
            let response = self.send(url).await?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| transport_error(url, e))?
                .to_vec();

            debug!(url = %url, bytes = body.len(), "Fetched");
            Ok(HttpResponse { status, body })
        })
        .await
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, HttpError> {
        self.with_retry(url, || async {
            let response = self.send(url).await?;
            let mut file = tokio::fs::File::create(dest).await?;
            let mut stream = response.bytes_stream();
            let mut written = 0u64;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| transport_error(url, e))?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;

            debug!(url = %url, bytes = written, dest = %dest.display(), "Downloaded");
            Ok(written)
        })
        .await
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> HttpError {
    HttpError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    }
}
