//! Idle session eviction.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::manager::{ChannelSessionManager, SessionState};
use crate::observability::metrics;

pub struct HeartbeatReaper {
    manager: Arc<ChannelSessionManager>,
    idle_timeout: chrono::Duration,
}

impl HeartbeatReaper {
    pub fn new(manager: Arc<ChannelSessionManager>, idle_timeout: Duration) -> Self {
        Self {
            manager,
            idle_timeout: chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Evict sessions that are idle, missing a heartbeat or past their event,
    /// plus launches that never completed
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<u32> {
        let idle_timeout = self.idle_timeout;
        let evicted = self
            .manager
            .evict_where(now, |session| {
                session.has_ended(now)
                    || match session.heartbeat() {
                        Some(heartbeat) => now - heartbeat > idle_timeout,
                        None => true,
                    }
            })
            .await;

        for channel in &evicted {
            info!("Channel {} session {}", channel, SessionState::IdleExpired);
        }
        if !evicted.is_empty() {
            metrics().sessions_evicted.add(evicted.len() as u64, &[]);
        }
        evicted
    }
}
