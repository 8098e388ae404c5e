use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use dispatch_engine::api;
use dispatch_engine::clock::SystemClock;
use dispatch_engine::config::{Config, LogFormat};
use dispatch_engine::engine::dispatcher;
use dispatch_engine::engine::notifications::{run_notification_worker, EventBusNotifier};
use dispatch_engine::error::AppError;
use dispatch_engine::state::AppState;
use dispatch_engine::store::JsonFilePersistence;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let persistence = Arc::new(JsonFilePersistence::open(&config.data_dir)?);
    let (app_state, outbox_rx) = AppState::new(&config, persistence, Arc::new(SystemClock))?;
    let shared_state = Arc::new(app_state);

    tracing::info!(
        data_dir = %config.data_dir.display(),
        drivers = shared_state.drivers.len(),
        requests = shared_state.requests.len(),
        timezone = %config.service_timezone,
        cutoff = %config.payment_cutoff,
        "state loaded"
    );

    let notifier = Arc::new(EventBusNotifier::new(shared_state.events_tx.clone()));
    tokio::spawn(run_notification_worker(
        shared_state.clone(),
        notifier,
        outbox_rx,
    ));

    let readvertised = dispatcher::readvertise_pending(&shared_state);
    if readvertised > 0 {
        tracing::info!(readvertised, "pending requests advertised again after restart");
    }

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
