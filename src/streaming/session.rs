//! Per-channel live session state.

use chrono::{DateTime, TimeZone, Utc};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::playlist::{PartRef, RewrittenPlaylist};
use crate::models::{Event, EventKey};
use crate::providers::StreamContext;

/// Proxied parts remembered per session
const PART_CACHE_SIZE: usize = 2048;

/// Consecutive upstream failures after which a live session is discarded
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// A rewritten chunklist and when it stops being fresh
#[derive(Debug, Clone)]
pub(crate) struct CachedChunklist {
    pub text: String,
    pub expires_at: Instant,
}

/// Guarded cache slot for one chunklist id. Holding the lock across the
/// upstream fetch collapses concurrent requests into one fetch.
pub(crate) type ChunklistSlot = Arc<Mutex<Option<CachedChunklist>>>;

pub struct ChannelSession {
    channel: u32,
    event: Arc<Event>,
    context: StreamContext,
    base: String,
    playlist: String,
    chunklist_urls: RwLock<HashMap<String, String>>,
    chunklist_cache: Mutex<HashMap<String, ChunklistSlot>>,
    parts: Mutex<LruCache<String, PartRef>>,
    /// Unix millis of the last successful access, 0 when never touched
    heartbeat: AtomicI64,
    failures: AtomicU32,
}

impl std::fmt::Debug for ChannelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSession")
            .field("channel", &self.channel)
            .field("event", &self.event.key())
            .field("master_url", &self.context.master_url)
            .finish()
    }
}

impl ChannelSession {
    pub(crate) fn new(
        channel: u32,
        event: Arc<Event>,
        context: StreamContext,
        base: String,
        top_level: RewrittenPlaylist,
        now: DateTime<Utc>,
    ) -> Self {
        let capacity = NonZeroUsize::new(PART_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        let mut parts = LruCache::new(capacity);
        for (id, part) in top_level.parts {
            parts.put(id, part);
        }
        Self {
            channel,
            event,
            context,
            base,
            playlist: top_level.text,
            chunklist_urls: RwLock::new(top_level.chunklists.into_iter().collect()),
            chunklist_cache: Mutex::new(HashMap::new()),
            parts: Mutex::new(parts),
            heartbeat: AtomicI64::new(now.timestamp_millis()),
            failures: AtomicU32::new(0),
        }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    pub fn event_key(&self) -> EventKey {
        self.event.key()
    }

    pub fn context(&self) -> &StreamContext {
        &self.context
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Rewritten top-level playlist
    pub fn playlist(&self) -> &str {
        &self.playlist
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.event.has_ended(now)
    }

    /// Advance the heartbeat; an older `now` arriving late never moves it back
    pub fn touch(&self, now: DateTime<Utc>) {
        self.heartbeat
            .fetch_max(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn heartbeat(&self) -> Option<DateTime<Utc>> {
        match self.heartbeat.load(Ordering::SeqCst) {
            0 => None,
            millis => Utc.timestamp_millis_opt(millis).single(),
        }
    }

    #[cfg(test)]
    pub(crate) fn clear_heartbeat(&self) {
        self.heartbeat.store(0, Ordering::SeqCst);
    }

    /// Count a failure, returning the consecutive total
    pub(crate) fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    pub async fn chunklist_url(&self, id: &str) -> Option<String> {
        self.chunklist_urls.read().await.get(id).cloned()
    }

    pub(crate) async fn chunklist_slot(&self, id: &str) -> ChunklistSlot {
        self.chunklist_cache
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Remember everything a freshly rewritten playlist advertises
    pub(crate) async fn register(&self, rewritten: &RewrittenPlaylist) {
        if !rewritten.chunklists.is_empty() {
            let mut urls = self.chunklist_urls.write().await;
            for (id, url) in &rewritten.chunklists {
                urls.insert(id.clone(), url.clone());
            }
        }
        let mut parts = self.parts.lock().await;
        for (id, part) in &rewritten.parts {
            parts.put(id.clone(), part.clone());
        }
    }

    pub async fn part(&self, id: &str) -> Option<PartRef> {
        self.parts.lock().await.get(id).cloned()
    }
}

/// Freshness window for a chunklist: half its target duration, capped
pub(crate) fn freshness_window(target: Option<Duration>, max_age: Duration) -> Duration {
    target.map(|t| t / 2).unwrap_or(max_age).min(max_age)
}
