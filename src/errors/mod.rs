//! Centralized error handling for the sports tuner
//!
//! Errors are split by the layer that produces them so that each caller can
//! decide locally whether a failure is recovered (logged and excluded) or
//! surfaced to an HTTP client.
//!
//! # Error Categories
//!
//! - **Provider Errors**: one subscription provider failed to fetch, refresh or resolve
//! - **Upstream Errors**: playlist, segment or key fetches against the live stream
//! - **Session Errors**: request-path failures for a channel session
//! - **Application Errors**: configuration and start-up failures
//!
//! # Usage
//!
//! ```rust
//! use sports_tuner::errors::{SessionError, SessionResult};
//!
//! fn example() -> SessionResult<()> {
//!     Err(SessionError::NoScheduledEvent { channel: 100 })
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for provider adapter Results
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Convenience type alias for upstream fetch Results
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Convenience type alias for channel session Results
pub type SessionResult<T> = Result<T, SessionError>;
