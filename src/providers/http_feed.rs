//! Config-driven provider backed by a JSON schedule feed
//!
//! The feed is a JSON array of events:
//!
//! ```json
//! [{
//!   "id": "match-42",
//!   "title": "Home v Away",
//!   "start": "2025-06-01T19:00:00Z",
//!   "end": "2025-06-01T21:00:00Z",
//!   "categories": ["Soccer"],
//!   "linear_channel": "sports1",
//!   "stream_url": "https://cdn.example.com/match-42/master.m3u8",
//!   "headers": { "Referer": "https://example.com" }
//! }]
//! ```
//!
//! When a `token_url` is configured it is POSTed to on refresh and the
//! returned `{ "token": "..." }` is sent as a bearer credential when
//! resolving streams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::traits::{ProviderAdapter, StreamContext};
use crate::config::ProviderConfig;
use crate::errors::{AppError, AppResult, ProviderError, ProviderResult};
use crate::models::{ChannelTarget, Event};

const STREAM_URL_KEY: &str = "stream_url";
const HEADER_KEY_PREFIX: &str = "header:";

#[derive(Debug, Deserialize)]
struct FeedEvent {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    linear_channel: Option<String>,
    stream_url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

pub struct HttpFeedProvider {
    config: ProviderConfig,
    client: Client,
    token: RwLock<Option<String>>,
}

impl HttpFeedProvider {
    pub fn new(config: ProviderConfig, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            token: RwLock::new(None),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.config
            .headers
            .iter()
            .fold(builder, |builder, (key, value)| builder.header(key, value))
    }

    fn unavailable(&self, err: reqwest::Error) -> ProviderError {
        ProviderError::unavailable(&self.config.name, err.to_string())
    }
}

/// Decode a feed body into events owned by `provider`
pub fn parse_schedule(provider: &str, body: &str) -> ProviderResult<Vec<Event>> {
    let items: Vec<FeedEvent> =
        serde_json::from_str(body).map_err(|e| ProviderError::parse(provider, e.to_string()))?;

    Ok(items
        .into_iter()
        .map(|item| {
            let mut metadata = BTreeMap::new();
            metadata.insert(STREAM_URL_KEY.to_string(), item.stream_url);
            for (key, value) in item.headers {
                metadata.insert(format!("{HEADER_KEY_PREFIX}{key}"), value);
            }
            Event {
                provider: provider.to_string(),
                external_id: item.id,
                title: item.title,
                start: item.start,
                end: item.end,
                categories: item.categories,
                target: match item.linear_channel {
                    Some(sub_channel) => ChannelTarget::Linear { sub_channel },
                    None => ChannelTarget::Pool,
                },
                metadata,
            }
        })
        .collect())
}

#[async_trait]
impl ProviderAdapter for HttpFeedProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn get_schedule(&self) -> ProviderResult<Vec<Event>> {
        let response = self
            .request(self.client.get(&self.config.schedule_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.unavailable(e))?;
        let body = response.text().await.map_err(|e| self.unavailable(e))?;
        let events = parse_schedule(&self.config.name, &body)?;
        debug!(
            "Provider {} returned {} event(s)",
            self.config.name,
            events.len()
        );
        Ok(events)
    }

    async fn refresh_tokens(&self) -> ProviderResult<()> {
        let Some(token_url) = &self.config.token_url else {
            return Ok(());
        };
        let response = self
            .request(self.client.post(token_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::auth_failed(&self.config.name, e.to_string()))?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(&self.config.name, e.to_string()))?;
        *self.token.write().await = Some(token.token);
        info!("Refreshed token for provider {}", self.config.name);
        Ok(())
    }

    async fn resolve_stream(&self, event: &Event) -> ProviderResult<StreamContext> {
        let stream_url =
            event
                .metadata
                .get(STREAM_URL_KEY)
                .ok_or_else(|| ProviderError::StreamNotFound {
                    provider: self.config.name.clone(),
                    external_id: event.external_id.clone(),
                })?;

        let mut context = StreamContext::new(stream_url.clone());
        for (key, value) in &self.config.headers {
            context = context.with_header(key, value);
        }
        for (key, value) in &event.metadata {
            if let Some(header) = key.strip_prefix(HEADER_KEY_PREFIX) {
                context = context.with_header(header, value);
            }
        }
        if let Some(token) = self.token.read().await.as_deref() {
            context = context.with_header("Authorization", format!("Bearer {token}"));
        }
        Ok(context)
    }
}
