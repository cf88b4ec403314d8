//! HLS playlist analysis and rewriting
//!
//! Classification goes through `m3u8-rs`. Rewriting stays line based so every
//! tag we do not touch reaches the client byte for byte: variant and rendition
//! URIs in master playlists, segment, key, init-map and rendition-report URIs in
//! media playlists. Every URI found is made absolute against the playlist it
//! came from, given a short deterministic id and replaced with a route on this
//! server.

use m3u8_rs::Playlist;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Upper bound on playlist bodies read from upstream
pub const MAX_PLAYLIST_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Master,
    Media,
}

/// What a proxied part id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Segment,
    Key,
    InitMap,
}

impl PartKind {
    /// Route suffix for this kind of part
    pub fn extension(self) -> &'static str {
        match self {
            Self::Segment => "ts",
            Self::Key => "key",
            Self::InitMap => "m4i",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ts" => Some(Self::Segment),
            "key" => Some(Self::Key),
            "m4i" => Some(Self::InitMap),
            _ => None,
        }
    }
}

/// An upstream URL this server will proxy on request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub url: String,
    pub kind: PartKind,
}

/// Rewritten text plus every id it advertises
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewrittenPlaylist {
    pub text: String,
    /// chunklist id → absolute upstream URL
    pub chunklists: Vec<(String, String)>,
    /// part id → upstream reference
    pub parts: Vec<(String, PartRef)>,
    pub target_duration: Option<Duration>,
}

/// Where rewritten URIs should point
#[derive(Debug, Clone)]
pub struct RewriteTarget<'a> {
    /// Absolute base URI of this server, without trailing slash
    pub base: &'a str,
    pub channel: u32,
    /// Route media segments through this server
    pub proxy_segments: bool,
}

impl RewriteTarget<'_> {
    pub fn chunklist_uri(&self, id: &str) -> String {
        format!("{}/chunklist/{}/{}.m3u8", self.base, self.channel, id)
    }

    pub fn part_uri(&self, id: &str, kind: PartKind) -> String {
        format!(
            "{}/channels/{}/{}.{}",
            self.base,
            self.channel,
            id,
            kind.extension()
        )
    }
}

/// Classify playlist text; `None` when it is not an HLS playlist at all
pub fn playlist_kind(text: &str) -> Option<PlaylistKind> {
    match m3u8_rs::parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MasterPlaylist(_)) => Some(PlaylistKind::Master),
        Ok(Playlist::MediaPlaylist(_)) => Some(PlaylistKind::Media),
        Err(_) => None,
    }
}

/// `#EXT-X-TARGETDURATION` of a media playlist, if it parses and is positive
pub fn target_duration(text: &str) -> Option<Duration> {
    let playlist = m3u8_rs::parse_media_playlist_res(text.as_bytes()).ok()?;
    let secs = playlist.target_duration as f64;
    (secs.is_finite() && secs > 0.0).then(|| Duration::from_secs_f64(secs))
}

/// Short deterministic id for an absolute upstream URL
pub fn resource_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// Best-effort absolutization of a URI relative to the playlist it appeared in
pub fn absolutize(base_playlist_url: &str, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }
    match url::Url::parse(base_playlist_url) {
        Ok(base) => base
            .join(uri)
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| uri.to_string()),
        Err(_) => match base_playlist_url.rfind('/') {
            Some(pos) => format!("{}{}", &base_playlist_url[..=pos], uri),
            None => uri.to_string(),
        },
    }
}

/// Replace the value of a quoted `URI="..."` attribute, if present
fn replace_uri_attr(line: &str, replace: impl FnOnce(&str) -> String) -> String {
    const ATTR: &str = "URI=\"";
    let Some(start) = line.find(ATTR).map(|pos| pos + ATTR.len()) else {
        return line.to_string();
    };
    let Some(len) = line[start..].find('"') else {
        return line.to_string();
    };
    let value = &line[start..start + len];
    format!("{}{}{}", &line[..start], replace(value), &line[start + len..])
}

/// Rewrite a master playlist so every variant and rendition is served as a chunklist
pub fn rewrite_master(text: &str, playlist_url: &str, target: &RewriteTarget<'_>) -> RewrittenPlaylist {
    let mut out = RewrittenPlaylist::default();
    let mut lines = Vec::new();
    let chunklist = |uri: &str, out: &mut RewrittenPlaylist| {
        register_chunklist(out, playlist_url, uri, target)
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("#EXT-X-MEDIA:") || line.starts_with("#EXT-X-I-FRAME-STREAM-INF:") {
            lines.push(replace_uri_attr(line, |uri| chunklist(uri, &mut out)));
        } else if line.starts_with("#EXT-X-SESSION-KEY:") {
            lines.push(replace_uri_attr(line, |uri| {
                register_part(&mut out, playlist_url, uri, PartKind::Key, target)
            }));
        } else if line.starts_with('#') {
            lines.push(line.to_string());
        } else {
            lines.push(chunklist(line, &mut out));
        }
    }

    out.text = join_lines(lines);
    out
}

/// Rewrite a media playlist so keys, init maps and (optionally) segments route through this server
pub fn rewrite_media(text: &str, playlist_url: &str, target: &RewriteTarget<'_>) -> RewrittenPlaylist {
    let mut out = RewrittenPlaylist {
        target_duration: target_duration(text),
        ..RewrittenPlaylist::default()
    };
    let mut lines = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("#EXT-X-KEY:") {
            lines.push(replace_uri_attr(line, |uri| {
                register_part(&mut out, playlist_url, uri, PartKind::Key, target)
            }));
        } else if line.starts_with("#EXT-X-MAP:") {
            lines.push(replace_uri_attr(line, |uri| {
                register_part(&mut out, playlist_url, uri, PartKind::InitMap, target)
            }));
        } else if line.starts_with("#EXT-X-PART:") || line.starts_with("#EXT-X-PRELOAD-HINT:") {
            lines.push(replace_uri_attr(line, |uri| segment_uri(&mut out, playlist_url, uri, target)));
        } else if line.starts_with("#EXT-X-RENDITION-REPORT:") {
            lines.push(replace_uri_attr(line, |uri| {
                register_chunklist(&mut out, playlist_url, uri, target)
            }));
        } else if line.starts_with('#') {
            lines.push(line.to_string());
        } else {
            lines.push(segment_uri(&mut out, playlist_url, line, target));
        }
    }

    out.text = join_lines(lines);
    out
}

/// Minimal master playlist wrapping a single chunklist
pub fn single_variant_master(chunklist_uri: &str) -> String {
    format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=0\n{chunklist_uri}\n")
}

fn segment_uri(
    out: &mut RewrittenPlaylist,
    playlist_url: &str,
    uri: &str,
    target: &RewriteTarget<'_>,
) -> String {
    if target.proxy_segments {
        register_part(out, playlist_url, uri, PartKind::Segment, target)
    } else {
        absolutize(playlist_url, uri)
    }
}

fn register_chunklist(
    out: &mut RewrittenPlaylist,
    playlist_url: &str,
    uri: &str,
    target: &RewriteTarget<'_>,
) -> String {
    let absolute = absolutize(playlist_url, uri);
    let id = resource_id(&absolute);
    let rewritten = target.chunklist_uri(&id);
    out.chunklists.push((id, absolute));
    rewritten
}

fn register_part(
    out: &mut RewrittenPlaylist,
    playlist_url: &str,
    uri: &str,
    kind: PartKind,
    target: &RewriteTarget<'_>,
) -> String {
    let absolute = absolutize(playlist_url, uri);
    let id = resource_id(&absolute);
    let rewritten = target.part_uri(&id, kind);
    out.parts.push((id, PartRef { url: absolute, kind }));
    rewritten
}

fn join_lines(lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
