//! M3U channel list generation.

use crate::config::{ChannelConfig, LinearChannelConfig};
use crate::providers::LinearLineup;

/// Display metadata for one channel number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListing {
    pub number: u32,
    pub name: String,
    pub group: String,
}

impl ChannelListing {
    pub fn pool(number: u32, channels: &ChannelConfig) -> Self {
        Self {
            number,
            name: format!("{} {}", channels.channel_name_prefix, number),
            group: channels.channel_name_prefix.clone(),
        }
    }

    pub fn linear(entry: &LinearChannelConfig, channels: &ChannelConfig) -> Self {
        Self {
            number: entry.number,
            name: entry.name.clone(),
            group: format!("{} Linear", channels.channel_name_prefix),
        }
    }

    /// Stable guide id shared by the M3U and XMLTV outputs
    pub fn tvg_id(&self) -> String {
        format!("{}.{}", env!("CARGO_PKG_NAME"), self.number)
    }
}

/// Every pool channel number, whether or not anything is scheduled on it
pub fn pool_listings(channels: &ChannelConfig) -> Vec<ChannelListing> {
    channels
        .pool_channels()
        .map(|number| ChannelListing::pool(number, channels))
        .collect()
}

pub fn linear_listings(channels: &ChannelConfig, lineup: &LinearLineup) -> Vec<ChannelListing> {
    lineup
        .entries()
        .iter()
        .map(|entry| ChannelListing::linear(entry, channels))
        .collect()
}

/// Render an extended M3U playlist pointing every channel at this server
pub fn generate_m3u(listings: &[ChannelListing], base: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut m3u = String::from("#EXTM3U\n");
    for listing in listings {
        m3u.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"{}\" tvg-name=\"{}\" tvg-chno=\"{}\" group-title=\"{}\",{}\n",
            listing.tvg_id(),
            listing.name,
            listing.number,
            listing.group,
            listing.name
        ));
        m3u.push_str(&format!("{}/channels/{}.m3u8\n", base, listing.number));
    }
    m3u
}
