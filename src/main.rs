use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sports_tuner::{
    config::Config,
    job_scheduling::BackgroundJobs,
    observability::init_meter_provider,
    providers::{LinearLineup, ProviderRegistry},
    schedule::{ScheduleBuilder, ScheduleService},
    streaming::{ChannelSessionManager, HeartbeatReaper, HttpUpstream, SessionSettings},
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "sports-tuner")]
#[command(version)]
#[command(about = "Virtual multi-channel tuner for live sports streaming subscriptions")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("sports_tuner={},tower_http=trace", cli.log_level)
    } else {
        format!("sports_tuner={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sports Tuner v{}", env!("CARGO_PKG_VERSION"));
    let meter_provider = init_meter_provider();

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    let config = Arc::new(config);

    let providers = Arc::new(ProviderRegistry::from_config(&config)?);
    let schedule = Arc::new(ScheduleService::new(
        ScheduleBuilder::from_config(&config)?,
        providers.clone(),
    ));
    let upstream = Arc::new(HttpUpstream::new(config.timers.upstream_timeout)?);
    let sessions = Arc::new(ChannelSessionManager::new(
        schedule.clone(),
        upstream,
        SessionSettings::from_config(&config),
    ));
    let reaper = Arc::new(HeartbeatReaper::new(
        sessions.clone(),
        config.timers.idle_timeout,
    ));

    for (name, result) in providers.initialize_all().await {
        if let Err(e) = result {
            warn!("Provider {} failed to initialize: {}", name, e);
        }
    }
    let report = schedule.refresh_schedule().await;
    info!(
        "Initial schedule: {} pool event(s), {} linear event(s)",
        report.rebuild.pool_scheduled, report.rebuild.linear_scheduled
    );

    let cancellation_token = CancellationToken::new();
    let jobs = BackgroundJobs::spawn(
        &config.timers,
        schedule.clone(),
        reaper,
        cancellation_token.clone(),
    );

    let state = AppState {
        config: config.clone(),
        lineup: Arc::new(LinearLineup::from_config(&config.linear_lineup)),
        schedule,
        sessions,
    };
    let server = WebServer::new(&config, state)?;
    let addr = server.addr();

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let server_token = cancellation_token.clone();
    let server_handle =
        tokio::spawn(async move { server.serve_with_cancellation(ready_tx, server_token).await });

    match ready_rx.await {
        Ok(Ok(())) => info!("Listening on http://{}", addr),
        Ok(Err(e)) => {
            error!("{}", e);
            jobs.shutdown().await;
            return Err(e);
        }
        Err(_) => warn!("Web server exited before reporting readiness"),
    }

    shutdown_signal().await;
    cancellation_token.cancel();
    jobs.shutdown().await;
    if let Ok(Err(e)) = server_handle.await {
        error!("Web server error: {}", e);
    }
    if let Err(e) = meter_provider.shutdown() {
        warn!("Meter provider shutdown failed: {}", e);
    }
    info!("Sports Tuner stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down"),
                }
            }
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}
