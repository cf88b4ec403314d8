#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use sports_tuner::config::{ChannelConfig, Config};
use sports_tuner::errors::{ProviderError, ProviderResult, UpstreamError, UpstreamResult};
use sports_tuner::models::{ChannelTarget, Event};
use sports_tuner::providers::{LinearLineup, ProviderAdapter, ProviderRegistry, StreamContext};
use sports_tuner::schedule::{EventFilter, ScheduleBuilder, ScheduleService};
use sports_tuner::streaming::{ChannelSessionManager, SessionSettings, UpstreamClient};
use sports_tuner::web::AppState;

pub const MASTER_URL: &str = "https://cdn.test/live/master.m3u8";
pub const VARIANT_URL: &str = "https://cdn.test/live/low/index.m3u8";
pub const SEGMENT_URL: &str = "https://cdn.test/live/low/seg1.ts";

pub const MASTER: &str = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow/index.m3u8\n";
pub const MEDIA: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1\n#EXTINF:6.0,\nseg1.ts\n";

pub fn event(provider: &str, id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
    Event {
        provider: provider.into(),
        external_id: id.into(),
        title: format!("Event {id}"),
        start,
        end,
        categories: vec!["Soccer".into()],
        target: ChannelTarget::Pool,
        metadata: BTreeMap::new(),
    }
}

/// An event live right now, ending in `minutes`
pub fn live_event(provider: &str, id: &str, minutes: i64) -> Event {
    let now = Utc::now();
    event(provider, id, now - Duration::minutes(5), now + Duration::minutes(minutes))
}

/// Provider that counts stream resolutions and can be slowed down or broken
pub struct MockProvider {
    pub name: String,
    pub events: Mutex<Vec<Event>>,
    pub resolve_calls: AtomicUsize,
    pub fail_resolve: AtomicBool,
    pub resolve_delay: std::time::Duration,
    pub inline_master: Option<&'static str>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
            resolve_calls: AtomicUsize::new(0),
            fail_resolve: AtomicBool::new(false),
            resolve_delay: std::time::Duration::ZERO,
            inline_master: None,
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    /// Hand the top-level playlist over with the stream instead of serving it upstream
    pub fn with_inline_master(mut self, text: &'static str) -> Self {
        self.inline_master = Some(text);
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_schedule(&self) -> ProviderResult<Vec<Event>> {
        Ok(self.events.lock().unwrap().clone())
    }

    async fn refresh_tokens(&self) -> ProviderResult<()> {
        Ok(())
    }

    async fn resolve_stream(&self, event: &Event) -> ProviderResult<StreamContext> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if !self.resolve_delay.is_zero() {
            tokio::time::sleep(self.resolve_delay).await;
        }
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(ProviderError::unavailable(&self.name, "login required"));
        }
        let context =
            StreamContext::new(MASTER_URL).with_header("X-Event", event.external_id.clone());
        Ok(match self.inline_master {
            Some(text) => context.with_inline_master(text),
            None => context,
        })
    }
}

/// Upstream serving canned bodies by URL
#[derive(Default)]
pub struct MockUpstream {
    pub bodies: Mutex<HashMap<String, Bytes>>,
    pub fetches: Mutex<HashMap<String, usize>>,
    pub fail: AtomicBool,
    pub delay: std::time::Duration,
}

impl MockUpstream {
    pub fn with_stream() -> Self {
        let upstream = Self::default();
        upstream.serve(MASTER_URL, MASTER);
        upstream.serve(VARIANT_URL, MEDIA);
        upstream.serve(SEGMENT_URL, "segment-bytes");
        upstream
    }

    pub fn serve(&self, url: &str, body: &'static str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), Bytes::from_static(body.as_bytes()));
    }

    pub fn fetches(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    async fn lookup(&self, url: &str) -> UpstreamResult<Bytes> {
        *self.fetches.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                status: 502,
                url: url.to_string(),
            });
        }
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| UpstreamError::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn fetch_text(
        &self,
        url: &str,
        _headers: &BTreeMap<String, String>,
    ) -> UpstreamResult<String> {
        let bytes = self.lookup(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn fetch_bytes(
        &self,
        url: &str,
        _headers: &BTreeMap<String, String>,
    ) -> UpstreamResult<Bytes> {
        self.lookup(url).await
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.channels = ChannelConfig {
        start_channel: 100,
        num_channels: 3,
        proxy_segments: true,
        ..ChannelConfig::default()
    };
    config.web.base_url = Some("http://tuner.test".into());
    config
}

/// Fully wired components around mock collaborators
pub struct Harness {
    pub config: Arc<Config>,
    pub provider: Arc<MockProvider>,
    pub upstream: Arc<MockUpstream>,
    pub schedule: Arc<ScheduleService>,
    pub sessions: Arc<ChannelSessionManager>,
}

impl Harness {
    pub async fn new(config: Config, provider: MockProvider, upstream: MockUpstream) -> Self {
        let config = Arc::new(config);
        let provider = Arc::new(provider);
        let upstream = Arc::new(upstream);

        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider.clone()).await;
        let builder = ScheduleBuilder::new(
            &config.channels,
            LinearLineup::from_config(&config.linear_lineup),
            EventFilter::from_config(&config.filters).unwrap(),
        );
        let schedule = Arc::new(ScheduleService::new(builder, registry));
        let sessions = Arc::new(ChannelSessionManager::new(
            schedule.clone(),
            upstream.clone(),
            SessionSettings::from_config(&config),
        ));
        Self {
            config,
            provider,
            upstream,
            schedule,
            sessions,
        }
    }

    /// Harness with one live event scheduled on channel 100
    pub async fn live() -> Self {
        let harness = Self::new(test_config(), MockProvider::new("mock"), MockUpstream::with_stream()).await;
        harness.schedule_events(vec![live_event("mock", "live", 60)]).await;
        harness
    }

    pub async fn schedule_events(&self, events: Vec<Event>) {
        self.schedule.ingest(events).await;
        self.schedule.rebuild().await;
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            lineup: Arc::new(LinearLineup::from_config(&self.config.linear_lineup)),
            schedule: self.schedule.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

/// Last path segment of a URI without its extension
pub fn id_from_uri(uri: &str) -> String {
    let file = uri.rsplit('/').next().unwrap();
    file.split('.').next().unwrap().to_string()
}
