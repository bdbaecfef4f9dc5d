//! Byte fetching for torrent downloads.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors from a byte fetch. Clonable so a single-flight group can share them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the declared content type contains `expected` (case-insensitive).
    pub fn has_content_type(&self, expected: &str) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(&expected.to_ascii_lowercase()))
    }
}

/// Fetches raw bytes from a URI.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    /// Fetch `uri` with extra request headers.
    ///
    /// Non-success statuses are returned as responses, not errors.
    async fn fetch(&self, uri: &str, headers: &[(String, String)])
        -> Result<FetchResponse, FetchError>;
}

/// `ByteFetcher` backed by reqwest.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(
        &self,
        uri: &str,
        headers: &[(String, String)],
    ) -> Result<FetchResponse, FetchError> {
        let mut request = self.client.get(uri);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(FetchResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Header list carrying a `Referer` when the page URL is known.
pub fn referer_headers(page_url: Option<&str>) -> Vec<(String, String)> {
    page_url
        .map(|url| vec![(REFERER.as_str().to_string(), url.to_string())])
        .unwrap_or_default()
}
