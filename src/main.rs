mod activity;
mod composer;
mod config;
mod credentials;
mod error;
mod execution;
mod model;
mod persistence;
mod report;
mod routes;
mod runner;
mod server;
mod session;
mod state;
mod status;
mod store;
mod view;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use activity::{ActivityLevel, ActivitySource};
use config::{CliArgs, DashboardConfig, LOG_FILE_PREFIX};
use persistence::{Persistence, SqliteKv};
use state::AppState;
use store::EntityStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = DashboardConfig::from_args(args)?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {:?}", config.data_dir))?;

    // Initialize tracing: stdout plus a daily rolling file in the data dir
    let file_appender = tracing_appender::rolling::daily(&config.data_dir, LOG_FILE_PREFIX);
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "testdeck=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!("Starting testdeck v{}", env!("CARGO_PKG_VERSION"));
    info!("Data dir: {:?}", config.data_dir);
    info!("Agent backend: {}", config.agent_url);
    info!("Run details from: {}", config.details_url);

    let kv = SqliteKv::open(&config.db_path())
        .with_context(|| format!("opening {:?}", config.db_path()))?;
    let mut persistence = Persistence::new(kv);
    if !config.seed {
        persistence = persistence.without_seed();
    }

    if let Some(path) = &config.import {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading import file {:?}", path))?;
        persistence
            .import_legacy(&raw)
            .with_context(|| format!("importing {:?}", path))?;
    }

    let store = EntityStore::open(persistence)?;
    let port = config.port;
    let state = Arc::new(AppState::new(config, store)?);

    state
        .activity
        .emit(
            ActivitySource::Dashboard,
            ActivityLevel::Info,
            format!("Dashboard starting on port {}", port),
        )
        .await;

    // Build and start HTTP server
    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Dashboard listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    info!("Dashboard shutting down");
    if let Err(e) = state.store.read().await.flush() {
        error!("Failed to flush store on exit: {}", e);
    }

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    ctrl_c.await;
    info!("Received shutdown signal");
    state
        .activity
        .emit(
            ActivitySource::Dashboard,
            ActivityLevel::Info,
            "Shutdown signal received",
        )
        .await;
}
