//! Provider adapter contract
//!
//! A provider adapter is the only component that knows how to talk to one
//! subscription service. The core consumes four operations: `initialize`,
//! `get_schedule`, `refresh_tokens` and `resolve_stream`. Login and
//! device-code flows live entirely behind these operations.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::errors::ProviderResult;
use crate::models::Event;

/// Everything the session layer needs to open and follow a live stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamContext {
    /// Absolute URL of the top-level playlist
    pub master_url: String,
    /// Headers sent with every upstream playlist, segment and key request
    pub headers: BTreeMap<String, String>,
    /// Top-level playlist text when the provider already fetched it
    pub inline_master: Option<String>,
}

impl StreamContext {
    pub fn new<S: Into<String>>(master_url: S) -> Self {
        Self {
            master_url: master_url.into(),
            ..Self::default()
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_inline_master<S: Into<String>>(mut self, content: S) -> Self {
        self.inline_master = Some(content.into());
        self
    }
}

/// One subscription service
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider name, also the `provider` field of its events
    fn name(&self) -> &str;

    /// One-off start-up work such as an initial token fetch
    async fn initialize(&self) -> ProviderResult<()> {
        self.refresh_tokens().await
    }

    /// Current and upcoming events
    async fn get_schedule(&self) -> ProviderResult<Vec<Event>>;

    /// Renew whatever opaque credentials the provider keeps
    async fn refresh_tokens(&self) -> ProviderResult<()>;

    /// Resolve a playable stream for `event`
    async fn resolve_stream(&self, event: &Event) -> ProviderResult<StreamContext>;
}
