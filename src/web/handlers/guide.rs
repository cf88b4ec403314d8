//! XMLTV guide routes.

use axum::{extract::State, response::Response};

use crate::proxy::{generate_xmltv, linear_listings, pool_listings};
use crate::web::AppState;
use crate::web::responses::{XML_CONTENT_TYPE, not_found, text};

/// GET /xmltv.xml
pub async fn pool_xmltv(State(state): State<AppState>) -> Response {
    let table = state.schedule.table().await;
    let listings = pool_listings(&state.config.channels);
    text(
        XML_CONTENT_TYPE,
        generate_xmltv(&listings, &table, state.config.channels.xmltv_padding),
    )
}

/// GET /linear-xmltv.xml
pub async fn linear_xmltv(State(state): State<AppState>) -> Response {
    if !state.config.channels.linear_channels_enabled {
        return not_found("linear-disabled", "linear channels are disabled");
    }
    let listings = linear_listings(&state.config.channels, &state.lineup);
    if listings.is_empty() {
        return not_found("empty-playlist", "no linear channels configured");
    }
    let table = state.schedule.table().await;
    text(
        XML_CONTENT_TYPE,
        generate_xmltv(&listings, &table, state.config.channels.xmltv_padding),
    )
}
