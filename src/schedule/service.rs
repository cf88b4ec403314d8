//! Schedule orchestration: provider fetches, the event store and the current table.
//!
//! Rebuilds are serialised behind one async mutex and coalesced through a pair
//! of generation counters. Every caller takes a ticket from `requested` before
//! queueing on the mutex. Once it holds the mutex, a caller whose ticket is not
//! newer than `completed` knows that a pass which started after its request
//! already ran, and returns that pass's report instead of running another.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::builder::{RebuildReport, ScheduleBuilder};
use super::event_store::EventStore;
use super::table::ChannelTable;
use crate::observability::metrics;
use crate::providers::ProviderRegistry;

/// Outcome of a full provider refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    /// Events returned per provider that answered
    pub fetched: BTreeMap<String, usize>,
    /// Error message per provider that failed
    pub failed: BTreeMap<String, String>,
    pub expired: usize,
    pub rebuild: RebuildReport,
}

struct RebuildState {
    completed: u64,
    last_report: RebuildReport,
}

pub struct ScheduleService {
    builder: ScheduleBuilder,
    providers: Arc<ProviderRegistry>,
    store: Mutex<EventStore>,
    table: RwLock<Arc<ChannelTable>>,
    requested: AtomicU64,
    rebuild: Mutex<RebuildState>,
}

impl ScheduleService {
    pub fn new(builder: ScheduleBuilder, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            builder,
            providers,
            store: Mutex::new(EventStore::new()),
            table: RwLock::new(Arc::new(ChannelTable::new())),
            requested: AtomicU64::new(0),
            rebuild: Mutex::new(RebuildState {
                completed: 0,
                last_report: RebuildReport::default(),
            }),
        }
    }

    /// Current table snapshot
    pub async fn table(&self) -> Arc<ChannelTable> {
        self.table.read().await.clone()
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub async fn event_count(&self) -> usize {
        self.store.lock().await.len()
    }

    /// Fetch every provider concurrently, store what arrived, then rebuild
    pub async fn refresh_schedule(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let outcome = self.providers.fetch_all_schedules().await;
        {
            let mut store = self.store.lock().await;
            for (name, result) in outcome {
                match result {
                    Ok(events) => {
                        let count = store.upsert_batch(events);
                        report.fetched.insert(name, count);
                    }
                    Err(e) => {
                        metrics().provider_failures.add(1, &[]);
                        report.failed.insert(name, e.to_string());
                    }
                }
            }
            report.expired = store.remove_expired(Utc::now());
        }
        report.rebuild = self.rebuild().await;
        info!(
            "Schedule refresh: {} provider(s) ok, {} failed, {} expired event(s) dropped",
            report.fetched.len(),
            report.failed.len(),
            report.expired
        );
        report
    }

    /// Refresh every provider's credentials, failures isolated per provider
    pub async fn refresh_tokens(&self) -> BTreeMap<String, Result<(), String>> {
        self.providers
            .refresh_all_tokens()
            .await
            .into_iter()
            .map(|(name, result)| {
                if result.is_err() {
                    metrics().provider_failures.add(1, &[]);
                }
                (name, result.map_err(|e| e.to_string()))
            })
            .collect()
    }

    /// Store events directly, bypassing provider fetches
    pub async fn ingest<I>(&self, events: I) -> usize
    where
        I: IntoIterator<Item = crate::models::Event>,
    {
        self.store.lock().await.upsert_batch(events)
    }

    /// Run an allocation pass against the latest store contents
    pub async fn rebuild(&self) -> RebuildReport {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.rebuild.lock().await;
        if state.completed >= ticket {
            debug!("Rebuild request {} coalesced into pass {}", ticket, state.completed);
            return state.last_report.clone();
        }
        // Everything requested so far is covered by the snapshot taken below
        let covers = self.requested.load(Ordering::SeqCst);

        let snapshot = self.store.lock().await.snapshot();
        let previous = self.table().await;
        let (table, report) = self.builder.rebuild(&snapshot, &previous);
        *self.table.write().await = Arc::new(table);

        metrics().schedule_rebuilds.add(1, &[]);
        metrics()
            .schedule_conflicts
            .add(report.conflicts.len() as u64, &[]);
        state.completed = covers;
        state.last_report = report.clone();
        report
    }

    /// Drop one provider's events and reallocate the rest
    pub async fn remove_provider(&self, name: &str) -> RebuildReport {
        let removed = self.store.lock().await.remove_provider(name);
        info!("Removed provider {} ({} event(s))", name, removed);
        self.rebuild().await
    }

    /// Drop events that ended at or before `now` and reallocate
    pub async fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let removed = self.store.lock().await.remove_expired(now);
        if removed > 0 {
            self.rebuild().await;
        }
        removed
    }

    /// Forget every event and empty the table
    pub async fn reset_all(&self) {
        let _state = self.rebuild.lock().await;
        self.store.lock().await.clear();
        *self.table.write().await = Arc::new(ChannelTable::new());
        info!("Schedule reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::models::{ChannelTarget, Event, EventKey};
    use crate::providers::LinearLineup;
    use crate::schedule::builder::EventFilter;
    use chrono::Duration;

    fn service() -> ScheduleService {
        let channels = ChannelConfig {
            start_channel: 100,
            num_channels: 3,
            ..ChannelConfig::default()
        };
        ScheduleService::new(
            ScheduleBuilder::new(&channels, LinearLineup::default(), EventFilter::default()),
            Arc::new(ProviderRegistry::new()),
        )
    }

    fn event(provider: &str, id: &str, start_hours: i64) -> Event {
        let start = Utc::now() + Duration::hours(start_hours);
        Event {
            provider: provider.into(),
            external_id: id.into(),
            title: id.into(),
            start,
            end: start + Duration::hours(1),
            categories: vec![],
            target: ChannelTarget::Pool,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_rebuilds_are_coalesced() {
        let service = Arc::new(service());
        service.ingest(vec![event("a", "1", 1)]).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move { service.rebuild().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().pool_scheduled, 1);
        }
        assert_eq!(service.table().await.event_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_provider_keeps_other_assignments() {
        let service = service();
        service
            .ingest(vec![event("a", "1", 1), event("b", "1", 1), event("b", "2", 3)])
            .await;
        service.rebuild().await;
        let before = service.table().await;
        let b1 = before.channel_of(&EventKey::new("b", "1"));

        service.remove_provider("a").await;
        let after = service.table().await;
        assert_eq!(after.channel_of(&EventKey::new("a", "1")), None);
        assert_eq!(after.channel_of(&EventKey::new("b", "1")), b1);
        assert_eq!(after.event_count(), 2);
    }

    #[tokio::test]
    async fn test_reset_all_empties_store_and_table() {
        let service = service();
        service.ingest(vec![event("a", "1", 1)]).await;
        service.rebuild().await;
        service.reset_all().await;
        assert!(service.table().await.is_empty());
        assert_eq!(service.event_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_expired_rebuilds() {
        let service = service();
        service
            .ingest(vec![event("a", "past", -3), event("a", "future", 2)])
            .await;
        service.rebuild().await;
        assert_eq!(service.remove_expired(Utc::now()).await, 1);
        assert_eq!(service.table().await.event_count(), 1);
    }
}
