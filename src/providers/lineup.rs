//! Read-only lineup binding provider sub-channels to fixed channel numbers.

use std::collections::HashMap;

use crate::config::LinearChannelConfig;

/// Lookup table built once from configuration
#[derive(Debug, Clone, Default)]
pub struct LinearLineup {
    entries: Vec<LinearChannelConfig>,
    by_sub_channel: HashMap<(String, String), u32>,
}

impl LinearLineup {
    pub fn from_config(entries: &[LinearChannelConfig]) -> Self {
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|entry| entry.number);
        let by_sub_channel = sorted
            .iter()
            .map(|entry| {
                (
                    (entry.provider.clone(), entry.sub_channel.clone()),
                    entry.number,
                )
            })
            .collect();
        Self {
            entries: sorted,
            by_sub_channel,
        }
    }

    /// Channel number bound to `provider`'s `sub_channel`
    pub fn channel_for(&self, provider: &str, sub_channel: &str) -> Option<u32> {
        self.by_sub_channel
            .get(&(provider.to_string(), sub_channel.to_string()))
            .copied()
    }

    /// Entries ordered by channel number
    pub fn entries(&self) -> &[LinearChannelConfig] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_ordering() {
        let lineup = LinearLineup::from_config(&[
            LinearChannelConfig {
                provider: "espn".into(),
                sub_channel: "espn2".into(),
                number: 12,
                name: "ESPN2".into(),
            },
            LinearChannelConfig {
                provider: "espn".into(),
                sub_channel: "espn1".into(),
                number: 11,
                name: "ESPN".into(),
            },
        ]);
        assert_eq!(lineup.channel_for("espn", "espn2"), Some(12));
        assert_eq!(lineup.channel_for("fox", "espn2"), None);
        assert_eq!(lineup.entries()[0].number, 11);
    }
}
