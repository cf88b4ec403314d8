//! Web layer module
//!
//! The HTTP interface DVR clients and operators talk to. Handlers are thin and
//! delegate to the schedule service and the session manager.
//!
//! - **Client routes**: channel lists, guides, playlists, chunklists and parts
//! - **Admin routes**: JSON API under `/api/v1`
//! - **Responses**: 404s with a diagnostic header, JSON wrappers for the API

use anyhow::Result;
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::providers::LinearLineup;
use crate::schedule::ScheduleService;
use crate::streaming::ChannelSessionManager;

pub mod handlers;
pub mod responses;
pub mod utils;

pub use responses::{ApiResponse, TUNER_ERROR_HEADER};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lineup: Arc<LinearLineup>,
    pub schedule: Arc<ScheduleService>,
    pub sessions: Arc<ChannelSessionManager>,
}

impl AppState {
    /// Pool channels always exist; linear ones only while enabled
    pub fn is_known_channel(&self, channel: u32) -> bool {
        let channels = &self.config.channels;
        channels.is_pool_channel(channel)
            || (channels.linear_channels_enabled
                && self.lineup.entries().iter().any(|e| e.number == channel))
    }
}

/// Build the full router for `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/channels.m3u", get(handlers::channels::pool_m3u))
        .route("/linear-channels.m3u", get(handlers::channels::linear_m3u))
        .route("/xmltv.xml", get(handlers::guide::pool_xmltv))
        .route("/linear-xmltv.xml", get(handlers::guide::linear_xmltv))
        .route("/channels/{file}", get(handlers::channels::channel_playlist))
        .route("/channels/{id}/{file}", get(handlers::channels::part))
        .route("/chunklist/{id}/{file}", get(handlers::channels::chunklist))
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/channels/status", get(handlers::admin::channel_status))
        .route("/channels/{id}/reset", post(handlers::admin::reset_channel))
        .route("/schedule/rebuild", post(handlers::admin::rebuild_schedule))
        .route("/schedule/reset", post(handlers::admin::reset_schedule))
        .route("/providers/{name}", delete(handlers::admin::remove_provider))
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        Ok(Self {
            app: router(state),
            addr,
        })
    }

    /// Serve until cancelled, notifying `ready_signal` once bound (or failed to bind)
    pub async fn serve_with_cancellation(
        self,
        ready_signal: tokio::sync::oneshot::Sender<Result<()>>,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => {
                let _ = ready_signal.send(Ok(()));
                // In-flight requests are not drained on shutdown
                tokio::select! {
                    result = axum::serve(listener, self.app).into_future() => result?,
                    _ = cancellation_token.cancelled() => {
                        tracing::info!("Web server received cancellation signal, shutting down");
                    }
                }
                Ok(())
            }
            Err(bind_error) => {
                let message = format!("Failed to bind to {}: {}", self.addr, bind_error);
                let _ = ready_signal.send(Err(anyhow::anyhow!("{}", message)));
                Err(anyhow::anyhow!("{}", message))
            }
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}
