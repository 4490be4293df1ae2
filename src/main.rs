use std::sync::Arc;

use cargoflow::api;
use cargoflow::config::{Config, LogFormat};
use cargoflow::engine::optimizer::{HttpOptimizer, NearestNeighborOptimizer, Optimizer};
use cargoflow::error::AppError;
use cargoflow::state::AppState;
use tracing_subscriber::EnvFilter;

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

    let optimizer: Arc<dyn Optimizer> = match &config.optimizer_url {
        Some(url) => {
            let optimizer = HttpOptimizer::new(url.clone(), config.optimizer_timeout)
                .map_err(|err| AppError::Internal(format!("optimizer client: {err}")))?;
            tracing::info!(optimizer_url = %url, "using external stop optimizer");
            Arc::new(optimizer)
        }
        None => Arc::new(NearestNeighborOptimizer),
    };

    let shared_state = Arc::new(AppState::with_optimizer(
        config.event_buffer_size,
        optimizer,
    ));
    let app = api::rest::router(shared_state);

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
