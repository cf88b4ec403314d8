//! Channel lists and the HLS proxy routes.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use crate::proxy::{generate_m3u, linear_listings, pool_listings};
use crate::streaming::PartKind;
use crate::web::AppState;
use crate::web::responses::{
    HLS_CONTENT_TYPE, M3U_CONTENT_TYPE, binary, not_found, session_error, text,
};
use crate::web::utils::{base_uri, parse_numbered_file};

/// GET /channels.m3u
pub async fn pool_m3u(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let listings = pool_listings(&state.config.channels);
    if listings.is_empty() {
        return not_found("empty-playlist", "no channels configured");
    }
    let base = base_uri(&headers, &state.config.web);
    text(M3U_CONTENT_TYPE, generate_m3u(&listings, &base))
}

/// GET /linear-channels.m3u
pub async fn linear_m3u(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.config.channels.linear_channels_enabled {
        return not_found("linear-disabled", "linear channels are disabled");
    }
    let listings = linear_listings(&state.config.channels, &state.lineup);
    if listings.is_empty() {
        return not_found("empty-playlist", "no linear channels configured");
    }
    let base = base_uri(&headers, &state.config.web);
    text(M3U_CONTENT_TYPE, generate_m3u(&listings, &base))
}

/// GET /channels/{id}.m3u8
pub async fn channel_playlist(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(channel) = parse_numbered_file(&file, "m3u8") else {
        return not_found("invalid-channel", format!("unknown channel {file}"));
    };
    if !state.is_known_channel(channel) {
        return not_found("invalid-channel", format!("unknown channel {channel}"));
    }

    let base = base_uri(&headers, &state.config.web);
    match state.sessions.ensure_launched(channel, &base).await {
        Ok(session) => text(HLS_CONTENT_TYPE, session.playlist().to_string()),
        Err(e) => session_error(&e),
    }
}

/// GET /chunklist/{id}/{chunklistId}.m3u8
pub async fn chunklist(
    State(state): State<AppState>,
    Path((channel, file)): Path<(String, String)>,
) -> Response {
    let Ok(channel) = channel.parse::<u32>() else {
        return not_found("invalid-channel", format!("unknown channel {channel}"));
    };
    let Some(chunklist_id) = file.strip_suffix(".m3u8") else {
        return not_found("unknown-chunklist", format!("unknown chunklist {file}"));
    };
    match state.sessions.get_chunklist(channel, chunklist_id).await {
        Ok(body) => text(HLS_CONTENT_TYPE, body),
        Err(e) => session_error(&e),
    }
}

/// GET /channels/{id}/{part}.ts|.key|.m4i
pub async fn part(
    State(state): State<AppState>,
    Path((channel, file)): Path<(String, String)>,
) -> Response {
    let Ok(channel) = channel.parse::<u32>() else {
        return not_found("invalid-channel", format!("unknown channel {channel}"));
    };
    let part_id = match file.rsplit_once('.') {
        Some((id, ext)) if PartKind::from_extension(ext).is_some() => id,
        _ => return not_found("unknown-part", format!("unknown part {file}")),
    };
    match state.sessions.get_segment_or_key(channel, part_id).await {
        Ok(part) => binary(part.content_type, part.bytes),
        Err(e) => session_error(&e),
    }
}
