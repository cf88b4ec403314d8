//! Error type definitions for the sports tuner
//!
//! This module defines the hierarchical error types used throughout the
//! application. Request-path errors carry a stable diagnostic code which the
//! web layer reports in the `X-Tuner-Error` header.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Provider adapter errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Failures of a single provider adapter.
///
/// These never abort a batch: the schedule service logs them per provider and
/// carries on with the remaining providers.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider could not be reached or refused the request
    #[error("Provider unavailable: {provider} - {message}")]
    Unavailable { provider: String, message: String },

    /// Authentication or token refresh failed
    #[error("Authentication failed: {provider} - {message}")]
    AuthenticationFailed { provider: String, message: String },

    /// The provider answered with data we could not interpret
    #[error("Parse error: {provider} - {message}")]
    Parse { provider: String, message: String },

    /// The provider has no stream for the requested event
    #[error("No stream available: {provider} event {external_id}")]
    StreamNotFound { provider: String, external_id: String },
}

impl ProviderError {
    pub fn unavailable<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn parse<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::Parse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn auth_failed<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::AuthenticationFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Errors from fetching playlist, segment or key content from the live upstream
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    /// The request did not complete within the configured upstream timeout
    #[error("Upstream timeout: {url}")]
    Timeout { url: String },

    /// The upstream answered with a non-success status
    #[error("Upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    /// Connection, TLS or body read failures
    #[error("Upstream transport error: {url} - {message}")]
    Transport { url: String, message: String },

    /// The upstream body was not valid text where a playlist was expected
    #[error("Upstream returned an invalid playlist: {url}")]
    InvalidPlaylist { url: String },
}

impl UpstreamError {
    /// Map a reqwest error onto the upstream taxonomy
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Request-path failures for a channel session
///
/// `Clone` so that one single-flight launch result can be handed to every
/// request that waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Nothing is scheduled on the channel right now
    #[error("No event scheduled on channel {channel}")]
    NoScheduledEvent { channel: u32 },

    /// The owning provider could not resolve a playable stream
    #[error("Launch failed for channel {channel}: {message}")]
    LaunchFailure { channel: u32, message: String },

    /// The channel has no live session yet
    #[error("Channel {channel} is not ready")]
    NotReady { channel: u32 },

    /// A chunklist, segment or key fetch failed
    #[error("Upstream unavailable for channel {channel}: {message}")]
    UpstreamUnavailable { channel: u32, message: String },

    /// The chunklist id was never advertised by this session
    #[error("Unknown chunklist {chunklist_id} on channel {channel}")]
    UnknownChunklist { channel: u32, chunklist_id: String },

    /// The segment or key id was never advertised by this session
    #[error("Unknown part {part_id} on channel {channel}")]
    UnknownPart { channel: u32, part_id: String },
}

impl SessionError {
    /// Stable code reported to clients in the diagnostic header
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoScheduledEvent { .. } => "no-scheduled-event",
            Self::LaunchFailure { .. } => "launch-failure",
            Self::NotReady { .. } => "not-ready",
            Self::UpstreamUnavailable { .. } => "upstream-unavailable",
            Self::UnknownChunklist { .. } => "unknown-chunklist",
            Self::UnknownPart { .. } => "unknown-part",
        }
    }

    /// Whether the same request may succeed shortly without resetting the channel.
    ///
    /// Launch failures leave the channel uninitialized so the next request
    /// launches again. Upstream failures on a live session count towards a reset,
    /// and an empty slot stays empty until the schedule changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LaunchFailure { .. } | Self::NotReady { .. })
    }

    pub fn channel(&self) -> u32 {
        match self {
            Self::NoScheduledEvent { channel }
            | Self::LaunchFailure { channel, .. }
            | Self::NotReady { channel }
            | Self::UpstreamUnavailable { channel, .. }
            | Self::UnknownChunklist { channel, .. }
            | Self::UnknownPart { channel, .. } => *channel,
        }
    }
}
