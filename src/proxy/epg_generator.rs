//! XMLTV programme guide generation.
//!
//! One `<programme>` per scheduled event. With padding enabled a programme's
//! stop is pushed out by [`PADDING_HOURS`] so DVR recordings survive overruns, but
//! never past the start of the next programme on the same channel.

use chrono::{DateTime, Duration, Utc};
use quick_xml::escape::escape;

use super::m3u_generator::ChannelListing;
use crate::schedule::ChannelTable;

pub const PADDING_HOURS: i64 = 1;

const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S %z";

fn padded_stop(end: DateTime<Utc>, next_start: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let padded = end + Duration::hours(PADDING_HOURS);
    match next_start {
        Some(next) if next < padded => next.max(end),
        _ => padded,
    }
}

/// Render the guide for `listings`, taking programmes from `table`
pub fn generate_xmltv(listings: &[ChannelListing], table: &ChannelTable, padding: bool) -> String {
    let mut xmltv = String::new();
    xmltv.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xmltv.push_str("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">\n");
    xmltv.push_str(&format!(
        "<tv generator-info-name=\"{}\">\n",
        env!("CARGO_PKG_NAME")
    ));

    for listing in listings {
        xmltv.push_str(&format!("  <channel id=\"{}\">\n", escape(&listing.tvg_id())));
        xmltv.push_str(&format!(
            "    <display-name>{}</display-name>\n",
            escape(&listing.name)
        ));
        xmltv.push_str(&format!(
            "    <display-name>{}</display-name>\n",
            listing.number
        ));
        xmltv.push_str("  </channel>\n");
    }

    for listing in listings {
        let Some(slot) = table.slot(listing.number) else {
            continue;
        };
        let channel_id = escape(&listing.tvg_id()).into_owned();
        for (index, event) in slot.events.iter().enumerate() {
            let stop = if padding {
                padded_stop(event.end, slot.events.get(index + 1).map(|next| next.start))
            } else {
                event.end
            };
            xmltv.push_str(&format!(
                "  <programme start=\"{}\" stop=\"{}\" channel=\"{}\">\n",
                event.start.format(XMLTV_TIME_FORMAT),
                stop.format(XMLTV_TIME_FORMAT),
                channel_id
            ));
            xmltv.push_str(&format!(
                "    <title lang=\"en\">{}</title>\n",
                escape(&event.title)
            ));
            for category in &event.categories {
                xmltv.push_str(&format!(
                    "    <category lang=\"en\">{}</category>\n",
                    escape(category)
                ));
            }
            xmltv.push_str("    <live/>\n");
            xmltv.push_str("  </programme>\n");
        }
    }

    xmltv.push_str("</tv>\n");
    xmltv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::models::{ChannelTarget, Event};
    use crate::schedule::{EventFilter, ScheduleBuilder, SequencedEvent};
    use crate::providers::LinearLineup;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_padding_is_capped_by_next_programme() {
        assert_eq!(padded_stop(at(1, 0), None), at(2, 0));
        assert_eq!(padded_stop(at(1, 0), Some(at(1, 30))), at(1, 30));
        assert_eq!(padded_stop(at(1, 0), Some(at(1, 0))), at(1, 0));
    }

    #[test]
    fn test_generate_xmltv_programmes() {
        let event = |id: &str, title: &str, start, end| SequencedEvent {
            sequence: 0,
            event: Event {
                provider: "p".into(),
                external_id: id.into(),
                title: title.into(),
                start,
                end,
                categories: vec!["Soccer".into()],
                target: ChannelTarget::Pool,
                metadata: Default::default(),
            },
        };
        let channels = ChannelConfig {
            start_channel: 100,
            num_channels: 1,
            ..ChannelConfig::default()
        };
        let builder = ScheduleBuilder::new(&channels, LinearLineup::default(), EventFilter::default());
        let (table, _) = builder.rebuild(
            &[
                event("a", "Home & Away", at(0, 0), at(1, 0)),
                event("b", "Late", at(1, 30), at(3, 0)),
            ],
            &ChannelTable::new(),
        );
        let listings = crate::proxy::pool_listings(&channels);

        let xml = generate_xmltv(&listings, &table, true);
        assert!(xml.contains("<channel id=\"sports-tuner.100\">"));
        assert!(xml.contains("Home &amp; Away"));
        assert!(xml.contains("start=\"20250601000000 +0000\" stop=\"20250601013000 +0000\""));
        assert!(xml.contains("start=\"20250601013000 +0000\" stop=\"20250601040000 +0000\""));
        assert!(xml.contains("<category lang=\"en\">Soccer</category>"));

        let unpadded = generate_xmltv(&listings, &table, false);
        assert!(unpadded.contains("stop=\"20250601010000 +0000\""));
    }
}
