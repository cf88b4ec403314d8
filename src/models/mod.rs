//! Core domain models shared by the scheduler and the session layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of an event across re-fetches: the owning provider plus the
/// provider's own id for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub provider: String,
    pub external_id: String,
}

impl EventKey {
    pub fn new<P: Into<String>, E: Into<String>>(provider: P, external_id: E) -> Self {
        Self {
            provider: provider.into(),
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.external_id)
    }
}

/// Where a provider would like an event to air
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelTarget {
    /// Any fungible pool channel
    #[default]
    Pool,
    /// A provider-declared linear sub-channel (e.g. a 24/7 network feed)
    Linear { sub_channel: String },
}

/// A fetched, immutable event. Superseded by a re-fetch with the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub provider: String,
    pub external_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub target: ChannelTarget,
    /// Opaque provider data needed later to resolve the stream
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Event {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.provider.clone(), self.external_id.clone())
    }

    /// Events with a zero or negative duration can never be scheduled
    pub fn has_valid_interval(&self) -> bool {
        self.end > self.start
    }

    /// Half-open `[start, end)` containment
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }

    /// Half-open intervals that merely touch do not overlap
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Kind of a channel slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelKind {
    /// Fungible slot reused across time
    Pool,
    /// Permanently bound to one provider sub-channel
    Linear {
        provider: String,
        sub_channel: String,
        name: String,
    },
}
