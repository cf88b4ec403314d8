//! Superset of fetched events, keyed by provider and external id.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::models::{Event, EventKey};

#[derive(Debug, Clone)]
struct StoredEvent {
    /// Fetch order of the first time this key was seen
    sequence: u64,
    event: Event,
}

/// Fetched-but-unscheduled events.
///
/// Re-fetching an event replaces its content but keeps its original fetch
/// sequence so "first fetched" stays stable across refreshes.
#[derive(Debug, Default)]
pub struct EventStore {
    events: HashMap<EventKey, StoredEvent>,
    next_sequence: u64,
}

/// An event paired with its fetch sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub event: Event,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a batch of events in the order they were fetched
    pub fn upsert_batch(&mut self, events: impl IntoIterator<Item = Event>) -> usize {
        let mut count = 0;
        for event in events {
            let key = event.key();
            match self.events.get_mut(&key) {
                Some(stored) => stored.event = event,
                None => {
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;
                    self.events.insert(key, StoredEvent { sequence, event });
                }
            }
            count += 1;
        }
        count
    }

    /// Drop every event owned by `provider`, returning how many were removed
    pub fn remove_provider(&mut self, provider: &str) -> usize {
        let before = self.events.len();
        self.events.retain(|key, _| key.provider != provider);
        let removed = before - self.events.len();
        debug!("Removed {} event(s) for provider {}", removed, provider);
        removed
    }

    /// Drop events that finished at or before `now`
    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.events.len();
        self.events.retain(|_, stored| !stored.event.has_ended(now));
        before - self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, key: &EventKey) -> Option<&Event> {
        self.events.get(key).map(|stored| &stored.event)
    }

    /// All events in fetch order
    pub fn snapshot(&self) -> Vec<SequencedEvent> {
        let mut events: Vec<SequencedEvent> = self
            .events
            .values()
            .map(|stored| SequencedEvent {
                sequence: stored.sequence,
                event: stored.event.clone(),
            })
            .collect();
        events.sort_by_key(|e| e.sequence);
        events
    }
}
