use std::sync::Arc;

use parcel_tracker::api;
use parcel_tracker::config::Config;
use parcel_tracker::error::AppError;
use parcel_tracker::routing::google::GoogleDirections;
use parcel_tracker::state::AppState;
use parcel_tracker::store::Repositories;
use parcel_tracker::store::memory::MemoryStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store = Arc::new(MemoryStore::new(config.event_buffer_size));
    let repos = Repositories::new(store.clone(), store);
    let provider = Arc::new(GoogleDirections::new(
        config.directions_base_url.clone(),
        config.directions_api_key.clone(),
    ));

    let app_state = AppState::new(
        repos,
        provider,
        config.engine_settings(),
        config.event_buffer_size,
    );
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        tick_interval_ms = config.tick_interval_ms,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    tracing::info!(
        active_simulations = shared_state.simulations.active_count(),
        "http server stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
