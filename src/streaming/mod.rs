//! Live channel sessions and the HLS proxy.
//!
//!   - playlist: line-level analysis and URI rewriting of master and media playlists
//!   - upstream: bounded fetches of playlists, segments and keys
//!   - session: per-channel cached state, heartbeat and failure counting
//!   - manager: the channel id → session registry with single-flight launches
//!   - reaper: idle eviction

pub mod manager;
pub mod playlist;
pub mod reaper;
pub mod session;
pub mod upstream;

pub use manager::{
    ChannelSessionManager, ProxiedPart, SessionSettings, SessionState, SessionStatus,
};
pub use playlist::PartKind;
pub use reaper::HeartbeatReaper;
pub use session::ChannelSession;
pub use upstream::{HttpUpstream, UpstreamClient};
