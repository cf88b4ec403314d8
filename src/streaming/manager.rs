//! Channel session registry
//!
//! Each channel id maps to an explicit lifecycle state:
//!
//! ```text
//! (absent) Uninitialized ──ensure_launched──▶ Launching ──ok──▶ Live
//!        ▲                                      │                │
//!        └───────────────── error ──────────────┘   reaper/reset ┘ (IdleExpired)
//! ```
//!
//! A launch runs as its own task and is shared through the registry, so
//! concurrent first requests for a channel all await the same upstream
//! resolution and a caller that goes away does not stall it. The task installs
//! its own result; the launch id guards against it clobbering a newer entry
//! after a reset.
//!
//! A session only serves while the event it was launched for still occupies
//! its slot in the current channel table. Rebuilds that move, shorten or
//! remove the event make the session stale, and the next request discards it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::playlist::{
    PartKind, PlaylistKind, RewriteTarget, RewrittenPlaylist, playlist_kind, resource_id,
    rewrite_master, rewrite_media, single_variant_master,
};
use super::session::{
    CachedChunklist, ChannelSession, MAX_CONSECUTIVE_FAILURES, freshness_window,
};
use super::upstream::UpstreamClient;
use crate::config::Config;
use crate::errors::{SessionError, SessionResult};
use crate::models::EventKey;
use crate::observability::metrics;
use crate::schedule::ScheduleService;

type LaunchFuture = Shared<BoxFuture<'static, SessionResult<Arc<ChannelSession>>>>;
type Registry = Arc<RwLock<HashMap<u32, SessionEntry>>>;

#[derive(Clone)]
enum SessionEntry {
    Launching {
        launch_id: Uuid,
        started_at: DateTime<Utc>,
        launch: LaunchFuture,
    },
    Live(Arc<ChannelSession>),
}

/// Lifecycle state reported by [`ChannelSessionManager::status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Launching,
    Live,
    IdleExpired,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub channel: u32,
    pub state: SessionState,
    pub event: Option<EventKey>,
    pub title: Option<String>,
    pub heartbeat_age_secs: Option<i64>,
}

/// Raw bytes of a proxied segment, key or init map
#[derive(Debug, Clone)]
pub struct ProxiedPart {
    pub bytes: Bytes,
    pub content_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub proxy_segments: bool,
    pub chunklist_max_age: Duration,
    pub upstream_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            proxy_segments: config.channels.proxy_segments,
            chunklist_max_age: config.timers.chunklist_max_age,
            upstream_timeout: config.timers.upstream_timeout,
        }
    }
}

pub struct ChannelSessionManager {
    schedule: Arc<ScheduleService>,
    upstream: Arc<dyn UpstreamClient>,
    settings: SessionSettings,
    sessions: Registry,
}

impl ChannelSessionManager {
    pub fn new(
        schedule: Arc<ScheduleService>,
        upstream: Arc<dyn UpstreamClient>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            schedule,
            upstream,
            settings,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Return the live session for `channel`, launching it if needed
    pub async fn ensure_launched(
        &self,
        channel: u32,
        base: &str,
    ) -> SessionResult<Arc<ChannelSession>> {
        self.ensure_launched_at(channel, base, Utc::now()).await
    }

    pub async fn ensure_launched_at(
        &self,
        channel: u32,
        base: &str,
        now: DateTime<Utc>,
    ) -> SessionResult<Arc<ChannelSession>> {
        // A joined launch may have been started for an earlier instant, so
        // its result is checked against the table once more
        for _ in 0..2 {
            let scheduled = self.scheduled_key(channel, now).await;
            let session = self.launch_or_join(channel, base, now, scheduled.as_ref()).await?;
            if serves(&session, scheduled.as_ref()) {
                session.touch(now);
                return Ok(session);
            }
            self.discard(&session).await;
        }
        Err(SessionError::NotReady { channel })
    }

    async fn launch_or_join(
        &self,
        channel: u32,
        base: &str,
        now: DateTime<Utc>,
        scheduled: Option<&EventKey>,
    ) -> SessionResult<Arc<ChannelSession>> {
        if let Some(SessionEntry::Live(session)) = self.sessions.read().await.get(&channel) {
            if serves(session, scheduled) {
                return Ok(session.clone());
            }
        }

        let launch = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(&channel).cloned() {
                Some(SessionEntry::Live(session)) if serves(&session, scheduled) => {
                    return Ok(session);
                }
                Some(SessionEntry::Launching { launch, .. }) => launch,
                stale => {
                    if let Some(SessionEntry::Live(session)) = stale {
                        info!(
                            "Channel {} event {} is no longer scheduled, relaunching",
                            channel,
                            session.event_key()
                        );
                    }
                    let launch_id = Uuid::new_v4();
                    let launch = self.spawn_launch(channel, base, now, launch_id);
                    sessions.insert(
                        channel,
                        SessionEntry::Launching {
                            launch_id,
                            started_at: now,
                            launch: launch.clone(),
                        },
                    );
                    launch
                }
            }
        };

        launch.await
    }

    fn spawn_launch(
        &self,
        channel: u32,
        base: &str,
        now: DateTime<Utc>,
        launch_id: Uuid,
    ) -> LaunchFuture {
        let schedule = self.schedule.clone();
        let upstream = self.upstream.clone();
        let settings = self.settings.clone();
        let sessions = self.sessions.clone();
        let base = base.trim_end_matches('/').to_string();
        let task = tokio::spawn(async move {
            let result = launch_session(channel, base, now, schedule, upstream, settings).await;
            finish_launch(&sessions, channel, launch_id, &result).await;
            result
        });
        async move {
            task.await.unwrap_or_else(|e| {
                Err(SessionError::LaunchFailure {
                    channel,
                    message: format!("launch task failed: {e}"),
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn scheduled_key(&self, channel: u32, now: DateTime<Utc>) -> Option<EventKey> {
        self.schedule
            .table()
            .await
            .event_at(channel, now)
            .map(|event| event.key())
    }

    /// Cached top-level playlist of a live session
    pub async fn get_playlist(&self, channel: u32) -> SessionResult<String> {
        let now = Utc::now();
        let session = self.live_session(channel, now).await?;
        session.touch(now);
        Ok(session.playlist().to_string())
    }

    /// Rewritten sub-playlist, served from cache while fresh
    pub async fn get_chunklist(&self, channel: u32, chunklist_id: &str) -> SessionResult<String> {
        let now = Utc::now();
        let session = self.live_session(channel, now).await?;
        let url = session
            .chunklist_url(chunklist_id)
            .await
            .ok_or_else(|| SessionError::UnknownChunklist {
                channel,
                chunklist_id: chunklist_id.to_string(),
            })?;

        let slot = session.chunklist_slot(chunklist_id).await;
        let mut cached = slot.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at > Instant::now() {
                session.touch(now);
                return Ok(entry.text.clone());
            }
        }

        metrics().chunklist_fetches.add(1, &[]);
        let text = match self
            .upstream
            .fetch_text(&url, &session.context().headers)
            .await
        {
            Ok(text) => text,
            Err(e) => return Err(self.upstream_failure(&session, e.to_string()).await),
        };

        let target = RewriteTarget {
            base: session.base(),
            channel,
            proxy_segments: self.settings.proxy_segments,
        };
        let rewritten = match playlist_kind(&text) {
            Some(PlaylistKind::Media) => rewrite_media(&text, &url, &target),
            Some(PlaylistKind::Master) => rewrite_master(&text, &url, &target),
            None => {
                let message = format!("{url} did not return an HLS playlist");
                return Err(self.upstream_failure(&session, message).await);
            }
        };
        session.register(&rewritten).await;

        let window = freshness_window(rewritten.target_duration, self.settings.chunklist_max_age);
        *cached = Some(CachedChunklist {
            text: rewritten.text.clone(),
            expires_at: Instant::now() + window,
        });
        session.record_success();
        session.touch(now);
        debug!(
            "Channel {} chunklist {} refreshed ({} part(s), fresh for {:?})",
            channel,
            chunklist_id,
            rewritten.parts.len(),
            window
        );
        Ok(rewritten.text)
    }

    /// Fetch segment, key or init-map bytes through the session
    pub async fn get_segment_or_key(&self, channel: u32, part_id: &str) -> SessionResult<ProxiedPart> {
        let now = Utc::now();
        let session = self.live_session(channel, now).await?;
        let part = session
            .part(part_id)
            .await
            .ok_or_else(|| SessionError::UnknownPart {
                channel,
                part_id: part_id.to_string(),
            })?;

        let bytes = match self
            .upstream
            .fetch_bytes(&part.url, &session.context().headers)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.upstream_failure(&session, e.to_string()).await),
        };

        metrics().part_bytes.add(bytes.len() as u64, &[]);
        session.record_success();
        session.touch(now);
        Ok(ProxiedPart {
            bytes,
            content_type: content_type(part.kind, &part.url),
        })
    }

    /// Discard a channel's session whatever its state
    pub async fn reset(&self, channel: u32) -> bool {
        let removed = self.sessions.write().await.remove(&channel).is_some();
        if removed {
            info!("Channel {} session reset", channel);
        }
        removed
    }

    /// Discard every session
    pub async fn reset_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        count
    }

    pub async fn state(&self, channel: u32) -> SessionState {
        match self.sessions.read().await.get(&channel) {
            Some(SessionEntry::Launching { .. }) => SessionState::Launching,
            Some(SessionEntry::Live(_)) => SessionState::Live,
            None => SessionState::Uninitialized,
        }
    }

    /// Snapshot of every channel with a session
    pub async fn status(&self, now: DateTime<Utc>) -> Vec<SessionStatus> {
        let sessions = self.sessions.read().await;
        let mut status: Vec<SessionStatus> = sessions
            .iter()
            .map(|(channel, entry)| match entry {
                SessionEntry::Launching { .. } => SessionStatus {
                    channel: *channel,
                    state: SessionState::Launching,
                    event: None,
                    title: None,
                    heartbeat_age_secs: None,
                },
                SessionEntry::Live(session) => SessionStatus {
                    channel: *channel,
                    state: SessionState::Live,
                    event: Some(session.event_key()),
                    title: Some(session.event().title.clone()),
                    heartbeat_age_secs: session.heartbeat().map(|hb| (now - hb).num_seconds()),
                },
            })
            .collect();
        status.sort_by_key(|s| s.channel);
        status
    }

    /// Remove live sessions matching `expired` and launches stuck past the
    /// launch deadline, returning their channel numbers
    pub(crate) async fn evict_where<F>(&self, now: DateTime<Utc>, expired: F) -> Vec<u32>
    where
        F: Fn(&ChannelSession) -> bool,
    {
        // Stream resolution and the top-level fetch are each bounded by the upstream timeout
        let deadline = chrono::Duration::from_std(self.settings.upstream_timeout * 2)
            .unwrap_or(chrono::Duration::MAX);
        let mut evicted = Vec::new();
        self.sessions.write().await.retain(|channel, entry| match entry {
            SessionEntry::Live(session) if expired(session) => {
                evicted.push(*channel);
                false
            }
            SessionEntry::Launching { started_at, .. } if now - *started_at > deadline => {
                warn!("Channel {} launch stalled, discarding it", channel);
                evicted.push(*channel);
                false
            }
            _ => true,
        });
        evicted.sort_unstable();
        evicted
    }

    async fn live_session(&self, channel: u32, now: DateTime<Utc>) -> SessionResult<Arc<ChannelSession>> {
        let session = match self.sessions.read().await.get(&channel) {
            Some(SessionEntry::Live(session)) => session.clone(),
            _ => return Err(SessionError::NotReady { channel }),
        };
        let scheduled = self.scheduled_key(channel, now).await;
        if !serves(&session, scheduled.as_ref()) {
            info!(
                "Channel {} event {} is no longer scheduled, discarding session",
                channel,
                session.event_key()
            );
            self.discard(&session).await;
            return Err(SessionError::NotReady { channel });
        }
        Ok(session)
    }

    /// Remove `session` if it is still the registered one
    async fn discard(&self, session: &Arc<ChannelSession>) {
        let mut sessions = self.sessions.write().await;
        let current = matches!(
            sessions.get(&session.channel()),
            Some(SessionEntry::Live(live)) if Arc::ptr_eq(live, session)
        );
        if current {
            sessions.remove(&session.channel());
        }
    }

    async fn upstream_failure(&self, session: &Arc<ChannelSession>, message: String) -> SessionError {
        let channel = session.channel();
        let failures = session.record_failure();
        warn!(
            "Channel {} upstream failure ({}/{}): {}",
            channel, failures, MAX_CONSECUTIVE_FAILURES, message
        );
        if failures >= MAX_CONSECUTIVE_FAILURES {
            warn!("Channel {} failed repeatedly, resetting session", channel);
            self.discard(session).await;
        }
        SessionError::UpstreamUnavailable { channel, message }
    }
}

/// Whether `session` is for the event the table currently has in its slot
fn serves(session: &ChannelSession, scheduled: Option<&EventKey>) -> bool {
    scheduled.is_some_and(|key| *key == session.event_key())
}

/// Install a launch result, unless the entry was reset or replaced meanwhile
async fn finish_launch(
    sessions: &RwLock<HashMap<u32, SessionEntry>>,
    channel: u32,
    launch_id: Uuid,
    result: &SessionResult<Arc<ChannelSession>>,
) {
    let mut sessions = sessions.write().await;
    let still_current = matches!(
        sessions.get(&channel),
        Some(SessionEntry::Launching { launch_id: id, .. }) if *id == launch_id
    );
    if !still_current {
        return;
    }
    match result {
        Ok(session) => {
            metrics().sessions_launched.add(1, &[]);
            info!(
                "Channel {} live: {} '{}'",
                channel,
                session.event_key(),
                session.event().title
            );
            sessions.insert(channel, SessionEntry::Live(session.clone()));
        }
        Err(e) => {
            if matches!(e, SessionError::LaunchFailure { .. }) {
                metrics().launch_failures.add(1, &[]);
            }
            warn!("Channel {} launch failed: {}", channel, e);
            sessions.remove(&channel);
        }
    }
}

async fn launch_session(
    channel: u32,
    base: String,
    now: DateTime<Utc>,
    schedule: Arc<ScheduleService>,
    upstream: Arc<dyn UpstreamClient>,
    settings: SessionSettings,
) -> SessionResult<Arc<ChannelSession>> {
    let failure = |message: String| SessionError::LaunchFailure { channel, message };

    let table = schedule.table().await;
    let event = table
        .event_at(channel, now)
        .ok_or(SessionError::NoScheduledEvent { channel })?;
    let provider = schedule
        .providers()
        .get(&event.provider)
        .await
        .ok_or_else(|| failure(format!("provider {} is not registered", event.provider)))?;

    let context = tokio::time::timeout(settings.upstream_timeout, provider.resolve_stream(&event))
        .await
        .map_err(|_| failure("stream resolution timed out".to_string()))?
        .map_err(|e| failure(e.to_string()))?;

    let master = match &context.inline_master {
        Some(text) => text.clone(),
        None => upstream
            .fetch_text(&context.master_url, &context.headers)
            .await
            .map_err(|e| failure(e.to_string()))?,
    };

    let target = RewriteTarget {
        base: &base,
        channel,
        proxy_segments: settings.proxy_segments,
    };
    let top_level = match playlist_kind(&master) {
        Some(PlaylistKind::Master) => rewrite_master(&master, &context.master_url, &target),
        Some(PlaylistKind::Media) => {
            // Serve a bare media playlist through a one-variant master so it
            // is refreshed like any other chunklist
            let id = resource_id(&context.master_url);
            RewrittenPlaylist {
                text: single_variant_master(&target.chunklist_uri(&id)),
                chunklists: vec![(id, context.master_url.clone())],
                ..RewrittenPlaylist::default()
            }
        }
        None => {
            return Err(failure(format!(
                "{} did not return an HLS playlist",
                context.master_url
            )));
        }
    };

    debug!(
        "Channel {} resolved {} to {} ({} chunklist(s))",
        channel,
        event.key(),
        context.master_url,
        top_level.chunklists.len()
    );
    Ok(Arc::new(ChannelSession::new(
        channel, event, context, base, top_level, now,
    )))
}

fn content_type(kind: PartKind, url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    match kind {
        PartKind::Key => "application/octet-stream",
        PartKind::InitMap => "video/mp4",
        PartKind::Segment if path.ends_with(".m4s") || path.ends_with(".mp4") => "video/mp4",
        PartKind::Segment if path.ends_with(".aac") => "audio/aac",
        PartKind::Segment => "video/mp2t",
    }
}
