//! Channel allocation.
//!
//! Maps the event store onto channel numbers:
//!
//! - **Linear events** go to the channel number the lineup binds their
//!   sub-channel to. Events are taken in fetch order and the first accepted
//!   event wins any overlap.
//! - **Pool events** are coloured onto `start_channel..start_channel+num_channels`
//!   with a bounded palette. Events keep the channel they held in the previous
//!   table when that still fits, everything else goes first-fit onto the lowest
//!   free channel number in `(start, end, fetch order)` order. No free channel
//!   means the event is dropped as a capacity conflict.
//!
//! Allocation is a pure function of its inputs, so rebuilding against an
//! unchanged store and the table it produced yields the same table again.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::event_store::SequencedEvent;
use super::table::{ChannelSlot, ChannelTable};
use crate::config::{ChannelConfig, Config, FilterConfig};
use crate::errors::{AppError, AppResult};
use crate::models::{ChannelKind, ChannelTarget, Event, EventKey};
use crate::providers::lineup::LinearLineup;

/// Why an event did not make it into the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictReason {
    /// Overlaps an event accepted earlier on the same linear channel
    LinearOverlap,
    /// Every pool channel is occupied during the event
    PoolCapacity,
}

/// An event dropped during allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleConflict {
    pub key: EventKey,
    pub title: String,
    pub channel: Option<u32>,
    pub reason: ConflictReason,
}

/// Outcome of one allocation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub pool_scheduled: usize,
    pub linear_scheduled: usize,
    /// Events kept on the channel they held before the rebuild
    pub pinned: usize,
    pub invalid: usize,
    pub filtered: usize,
    pub conflicts: Vec<ScheduleConflict>,
}

/// Category and title exclusion rules
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    categories: Vec<String>,
    title: Option<Regex>,
}

impl EventFilter {
    pub fn from_config(config: &FilterConfig) -> AppResult<Self> {
        let title = config
            .title_filter
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .map(Regex::new)
            .transpose()
            .map_err(|e| AppError::configuration(format!("invalid title_filter: {e}")))?;
        Ok(Self {
            categories: config
                .category_filter
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
            title,
        })
    }

    pub fn accepts(&self, event: &Event) -> bool {
        if !self.categories.is_empty()
            && !event
                .categories
                .iter()
                .any(|c| self.categories.contains(&c.to_lowercase()))
        {
            return false;
        }
        match &self.title {
            Some(re) => !re.is_match(&event.title),
            None => true,
        }
    }
}

/// Allocation policy derived from configuration
#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    start_channel: u32,
    num_channels: u32,
    linear_enabled: bool,
    lineup: LinearLineup,
    filter: EventFilter,
}

impl ScheduleBuilder {
    pub fn new(
        channels: &ChannelConfig,
        lineup: LinearLineup,
        filter: EventFilter,
    ) -> Self {
        Self {
            start_channel: channels.start_channel,
            num_channels: channels.num_channels,
            linear_enabled: channels.linear_channels_enabled,
            lineup,
            filter,
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Ok(Self::new(
            &config.channels,
            LinearLineup::from_config(&config.linear_lineup),
            EventFilter::from_config(&config.filters)?,
        ))
    }

    fn is_pool_channel(&self, number: u32) -> bool {
        number >= self.start_channel && number < self.start_channel + self.num_channels
    }

    /// Linear channel number for an event, if it should air on one
    fn linear_channel_for(&self, event: &Event) -> Option<u32> {
        if !self.linear_enabled {
            return None;
        }
        match &event.target {
            ChannelTarget::Linear { sub_channel } => {
                self.lineup.channel_for(&event.provider, sub_channel)
            }
            ChannelTarget::Pool => None,
        }
    }

    fn empty_slots(&self) -> BTreeMap<u32, ChannelSlot> {
        let mut slots = BTreeMap::new();
        for number in self.start_channel..self.start_channel + self.num_channels {
            slots.insert(number, ChannelSlot::new(number, ChannelKind::Pool));
        }
        if self.linear_enabled {
            for entry in self.lineup.entries() {
                slots.insert(
                    entry.number,
                    ChannelSlot::new(
                        entry.number,
                        ChannelKind::Linear {
                            provider: entry.provider.clone(),
                            sub_channel: entry.sub_channel.clone(),
                            name: entry.name.clone(),
                        },
                    ),
                );
            }
        }
        slots
    }

    /// Allocate `events` (in fetch order) onto channels, pinning to `previous` where possible.
    pub fn rebuild(
        &self,
        events: &[SequencedEvent],
        previous: &ChannelTable,
    ) -> (ChannelTable, RebuildReport) {
        let mut report = RebuildReport::default();
        let mut slots = self.empty_slots();
        let mut linear: BTreeMap<u32, Vec<&SequencedEvent>> = BTreeMap::new();
        let mut pool: Vec<&SequencedEvent> = Vec::new();

        for sequenced in events {
            let event = &sequenced.event;
            if !event.has_valid_interval() {
                debug!("Dropping {} with non-positive duration", event.key());
                report.invalid += 1;
                continue;
            }
            if !self.filter.accepts(event) {
                report.filtered += 1;
                continue;
            }
            match self.linear_channel_for(event) {
                Some(number) => linear.entry(number).or_default().push(sequenced),
                None => pool.push(sequenced),
            }
        }

        self.allocate_linear(&mut slots, linear, &mut report);
        self.allocate_pool(&mut slots, pool, previous, &mut report);

        for conflict in &report.conflicts {
            warn!(
                "Schedule conflict ({}): dropped {} '{}'{}",
                conflict.reason,
                conflict.key,
                conflict.title,
                conflict
                    .channel
                    .map(|n| format!(" on channel {n}"))
                    .unwrap_or_default()
            );
        }
        info!(
            "Schedule rebuilt: {} pool event(s) ({} pinned), {} linear event(s), {} conflict(s), {} invalid, {} filtered",
            report.pool_scheduled,
            report.pinned,
            report.linear_scheduled,
            report.conflicts.len(),
            report.invalid,
            report.filtered
        );

        (ChannelTable::from_slots(slots), report)
    }

    fn allocate_linear(
        &self,
        slots: &mut BTreeMap<u32, ChannelSlot>,
        linear: BTreeMap<u32, Vec<&SequencedEvent>>,
        report: &mut RebuildReport,
    ) {
        for (number, events) in linear {
            let Some(slot) = slots.get_mut(&number) else {
                continue;
            };
            // Already in fetch order: first accepted wins
            for sequenced in events {
                let event = &sequenced.event;
                if slot.fits(event) {
                    slot.insert_sorted(Arc::new(event.clone()));
                    report.linear_scheduled += 1;
                } else {
                    report.conflicts.push(ScheduleConflict {
                        key: event.key(),
                        title: event.title.clone(),
                        channel: Some(number),
                        reason: ConflictReason::LinearOverlap,
                    });
                }
            }
        }
    }

    fn allocate_pool(
        &self,
        slots: &mut BTreeMap<u32, ChannelSlot>,
        mut pool: Vec<&SequencedEvent>,
        previous: &ChannelTable,
        report: &mut RebuildReport,
    ) {
        pool.sort_by(|a, b| {
            (a.event.start, a.event.end, a.sequence).cmp(&(b.event.start, b.event.end, b.sequence))
        });

        let pinned_to: HashMap<EventKey, u32> = previous
            .assignments()
            .into_iter()
            .filter(|(_, number)| {
                self.is_pool_channel(*number)
                    && previous.slot(*number).is_some_and(|slot| !slot.is_linear())
            })
            .collect();

        let mut unplaced = Vec::new();
        for sequenced in pool {
            let event = &sequenced.event;
            let pinned_slot = pinned_to
                .get(&event.key())
                .and_then(|number| slots.get_mut(number));
            match pinned_slot {
                Some(slot) if slot.fits(event) => {
                    slot.insert_sorted(Arc::new(event.clone()));
                    report.pool_scheduled += 1;
                    report.pinned += 1;
                }
                _ => unplaced.push(sequenced),
            }
        }

        for sequenced in unplaced {
            let event = &sequenced.event;
            let free = (self.start_channel..self.start_channel + self.num_channels)
                .find(|number| slots.get(number).is_some_and(|slot| slot.fits(event)));
            match free.and_then(|number| slots.get_mut(&number)) {
                Some(slot) => {
                    slot.insert_sorted(Arc::new(event.clone()));
                    report.pool_scheduled += 1;
                }
                None => report.conflicts.push(ScheduleConflict {
                    key: event.key(),
                    title: event.title.clone(),
                    channel: None,
                    reason: ConflictReason::PoolCapacity,
                }),
            }
        }
    }
}
