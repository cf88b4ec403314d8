//! Event storage, channel allocation and the channel table.

pub mod builder;
pub mod event_store;
pub mod service;
pub mod table;

pub use builder::{ConflictReason, EventFilter, RebuildReport, ScheduleBuilder, ScheduleConflict};
pub use event_store::{EventStore, SequencedEvent};
pub use service::{RefreshReport, ScheduleService};
pub use table::{ChannelSlot, ChannelTable};
