mod cluster;
mod config;
mod handlers;
mod monitor;
mod scheduler;
mod state;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{MasterConfig, DEFAULT_LOG_FILTER};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = MasterConfig::from_env();
    info!("configuración: {:?}", config);

    let state = AppState::new();

    // suscriptor único de cambios de estado del scheduler
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    state.scheduler().on_state_change(events_tx);
    tokio::spawn(monitor::watch_state_changes(events_rx));

    // monitor de heartbeats en segundo plano
    tokio::spawn(monitor::monitor_workers(
        state.clone(),
        config.heartbeat_timeout,
        config.dead_worker_retention,
        config.monitor_interval,
    ));
    tokio::spawn(monitor::log_status_loop(
        state.clone(),
        config.status_log_interval,
    ));

    // router HTTP
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
