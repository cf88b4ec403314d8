//! Immutable channel table snapshots produced by the schedule builder.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::models::{ChannelKind, Event, EventKey};

/// One channel number and its timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSlot {
    pub number: u32,
    pub kind: ChannelKind,
    /// Sorted by start time, never overlapping
    pub events: Vec<Arc<Event>>,
}

impl ChannelSlot {
    pub fn new(number: u32, kind: ChannelKind) -> Self {
        Self {
            number,
            kind,
            events: Vec::new(),
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self.kind, ChannelKind::Linear { .. })
    }

    /// Whether `event` fits without overlapping anything already on the slot
    pub fn fits(&self, event: &Event) -> bool {
        !self.events.iter().any(|existing| existing.overlaps(event))
    }

    /// Insert keeping start order; callers check `fits` first
    pub(crate) fn insert_sorted(&mut self, event: Arc<Event>) {
        let pos = self
            .events
            .partition_point(|existing| (existing.start, existing.end) <= (event.start, event.end));
        self.events.insert(pos, event);
    }

    pub fn event_at(&self, now: DateTime<Utc>) -> Option<&Arc<Event>> {
        self.events.iter().find(|event| event.is_live_at(now))
    }
}

/// Channel number → timeline. Replaced wholesale on every rebuild so readers
/// never observe a partially updated table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChannelTable {
    slots: BTreeMap<u32, ChannelSlot>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_slots(slots: BTreeMap<u32, ChannelSlot>) -> Self {
        Self { slots }
    }

    pub fn slot(&self, number: u32) -> Option<&ChannelSlot> {
        self.slots.get(&number)
    }

    pub fn slots(&self) -> impl Iterator<Item = &ChannelSlot> {
        self.slots.values()
    }

    /// The event occupying `number` at `now`
    pub fn event_at(&self, number: u32, now: DateTime<Utc>) -> Option<Arc<Event>> {
        self.slots
            .get(&number)
            .and_then(|slot| slot.event_at(now))
            .cloned()
    }

    /// Event key → channel number, used to pin events across rebuilds
    pub fn assignments(&self) -> HashMap<EventKey, u32> {
        self.slots
            .values()
            .flat_map(|slot| slot.events.iter().map(move |e| (e.key(), slot.number)))
            .collect()
    }

    pub fn channel_of(&self, key: &EventKey) -> Option<u32> {
        self.slots
            .values()
            .find(|slot| slot.events.iter().any(|e| &e.key() == key))
            .map(|slot| slot.number)
    }

    pub fn event_count(&self) -> usize {
        self.slots.values().map(|slot| slot.events.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.event_count() == 0
    }
}
