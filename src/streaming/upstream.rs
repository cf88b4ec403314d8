//! Upstream fetches for playlists, segments and keys.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;

use super::playlist::MAX_PLAYLIST_BYTES;
use crate::errors::{AppError, AppResult, UpstreamError, UpstreamResult};

/// Live-stream fetches with bounded waits
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetch playlist text (bounded in size)
    async fn fetch_text(&self, url: &str, headers: &BTreeMap<String, String>)
    -> UpstreamResult<String>;

    /// Fetch raw segment or key bytes
    async fn fetch_bytes(&self, url: &str, headers: &BTreeMap<String, String>)
    -> UpstreamResult<Bytes>;
}

/// `reqwest`-backed upstream client shared by every session
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    async fn send(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> UpstreamResult<reqwest::Response> {
        let request = headers
            .iter()
            .fold(self.client.get(url).timeout(self.timeout), |req, (k, v)| {
                req.header(k, v)
            });
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(url, e))?;
        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn fetch_text(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> UpstreamResult<String> {
        let response = self.send(url, headers).await?;

        // Stream body in chunks, limit total
        let mut body = response.bytes_stream();
        let mut collected: Vec<u8> = Vec::with_capacity(8192);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| UpstreamError::from_reqwest(url, e))?;
            if collected.len() + chunk.len() > MAX_PLAYLIST_BYTES {
                return Err(UpstreamError::InvalidPlaylist {
                    url: url.to_string(),
                });
            }
            collected.extend_from_slice(&chunk);
        }

        String::from_utf8(collected).map_err(|_| UpstreamError::InvalidPlaylist {
            url: url.to_string(),
        })
    }

    async fn fetch_bytes(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> UpstreamResult<Bytes> {
        self.send(url, headers)
            .await?
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(url, e))
    }
}
