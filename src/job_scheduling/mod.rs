//! Background timers: schedule rebuild, token refresh and the session reaper.
//!
//! Each timer is an independent task. A slow provider refresh never delays the
//! reaper, and no request outcome cancels a timer; only the shared
//! cancellation token does.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::TimerConfig;
use crate::schedule::ScheduleService;
use crate::streaming::HeartbeatReaper;

pub struct BackgroundJobs {
    cancellation_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundJobs {
    /// Spawn every timer loop
    pub fn spawn(
        timers: &TimerConfig,
        schedule: Arc<ScheduleService>,
        reaper: Arc<HeartbeatReaper>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let mut handles = Vec::new();

        let rebuild_schedule = schedule.clone();
        handles.push(spawn_interval(
            "schedule rebuild",
            timers.rebuild_interval,
            cancellation_token.clone(),
            move || {
                let schedule = rebuild_schedule.clone();
                async move {
                    schedule.refresh_schedule().await;
                }
            },
        ));

        handles.push(spawn_interval(
            "token refresh",
            timers.token_refresh_interval,
            cancellation_token.clone(),
            move || {
                let schedule = schedule.clone();
                async move {
                    schedule.refresh_tokens().await;
                }
            },
        ));

        handles.push(spawn_interval(
            "session reaper",
            timers.reap_interval,
            cancellation_token.clone(),
            move || {
                let reaper = reaper.clone();
                async move {
                    let evicted = reaper.sweep(Utc::now()).await;
                    if !evicted.is_empty() {
                        info!("Reaper evicted {} session(s): {:?}", evicted.len(), evicted);
                    }
                }
            },
        ));

        Self {
            cancellation_token,
            handles,
        }
    }

    /// Cancel every loop; a job caught mid-run is aborted rather than awaited
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        for handle in self.handles {
            handle.abort();
            let _ = handle.await;
        }
        info!("Background jobs stopped");
    }
}

/// Run `job` every `period` until cancelled. The immediate first tick is
/// skipped since start-up performs the initial pass itself.
fn spawn_interval<F, Fut>(
    name: &'static str,
    period: Duration,
    cancellation_token: CancellationToken,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!("Starting {} job every {:?}", name, period);
        let mut ticker = interval(period.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Running {} job", name);
                    job().await;
                }
                _ = cancellation_token.cancelled() => {
                    info!("{} job received cancellation signal, shutting down", name);
                    break;
                }
            }
        }
    })
}
