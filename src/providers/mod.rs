//! Provider adapters: the boundary to subscription services.

pub mod http_feed;
pub mod lineup;
pub mod registry;
pub mod traits;

pub use http_feed::HttpFeedProvider;
pub use lineup::LinearLineup;
pub use registry::{BatchOutcome, ProviderRegistry};
pub use traits::{ProviderAdapter, StreamContext};
