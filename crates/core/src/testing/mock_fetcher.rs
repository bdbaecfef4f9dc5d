//! Mock byte fetcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::metadata::{ByteFetcher, FetchError, FetchResponse, TORRENT_CONTENT_TYPE};

/// A recorded fetch: URI and request headers.
pub type RecordedFetch = (String, Vec<(String, String)>);

/// Mock implementation of the ByteFetcher trait.
///
/// URIs without a configured response answer with a 404.
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, Result<FetchResponse, FetchError>>>>,
    requests: Arc<RwLock<Vec<RecordedFetch>>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `uri` with `response`.
    pub async fn respond(&self, uri: &str, response: FetchResponse) {
        self.responses
            .write()
            .await
            .insert(uri.to_string(), Ok(response));
    }

    /// Answer `uri` with a 200 torrent download.
    pub async fn respond_torrent(&self, uri: &str, bytes: Vec<u8>) {
        self.respond(
            uri,
            FetchResponse {
                status: 200,
                content_type: Some(TORRENT_CONTENT_TYPE.to_string()),
                body: bytes,
            },
        )
        .await;
    }

    /// Fail every fetch of `uri` with `error`.
    pub async fn fail(&self, uri: &str, error: FetchError) {
        self.responses
            .write()
            .await
            .insert(uri.to_string(), Err(error));
    }

    /// Delay every response, to hold fetches in flight.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn requests(&self) -> Vec<RecordedFetch> {
        self.requests.read().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl ByteFetcher for MockFetcher {
    async fn fetch(
        &self,
        uri: &str,
        headers: &[(String, String)],
    ) -> Result<FetchResponse, FetchError> {
        self.requests
            .write()
            .await
            .push((uri.to_string(), headers.to_vec()));

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .read()
            .await
            .get(uri)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }
}
