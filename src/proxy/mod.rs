//! Output generation for DVR clients: M3U channel lists and XMLTV guides.

pub mod epg_generator;
pub mod m3u_generator;

pub use epg_generator::generate_xmltv;
pub use m3u_generator::{ChannelListing, generate_m3u, linear_listings, pool_listings};
