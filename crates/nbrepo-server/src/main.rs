//! Entry point for the nbrepo-server binary.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use http::HeaderValue;
use nbrepo_server::{
    config::{ConfigError, LogFormat, ServerConfig},
    events::EventBroadcaster,
    middleware::request_id::{propagate_request_id, request_id_layer},
    routes,
    state::AppState,
};
use nbrepo_store::{Store, StoreConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    init_tracing(&config.log_level, config.log_format);

    tracing::info!("Starting nbrepo-server");
    tracing::info!(
        port = config.port,
        log_level = %config.log_level,
        users_path = %config.users_path.display(),
        heartbeat_interval_secs = config.heartbeat_interval.as_secs(),
        liveness_window_secs = config.liveness_window.as_secs(),
        "Configuration loaded"
    );
    if config.allow_dev_identity {
        tracing::warn!("ALLOW_DEV_IDENTITY is on: X-Username is trusted without a token");
    }

    let store = match &config.database_url {
        Some(_) => {
            let store = Store::connect(StoreConfig::from_env()?).await?;
            tracing::info!("Connected to database");
            store
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; using the in-memory store, data is lost on exit");
            Store::in_memory()
        }
    };

    let state = AppState::new(store, config.clone());
    tokio::spawn(sweep_event_channels(Arc::clone(state.broadcaster())));

    let cors = build_cors_layer(&config.cors_allowed_origins)?;

    let app = routes::build_router(state)
        .layer(middleware::from_fn(propagate_request_id))
        .layer(request_id_layer())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

const CHANNEL_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Drop event channels whose subscribers have all disconnected.
async fn sweep_event_channels(broadcaster: Arc<EventBroadcaster>) {
    let mut interval = tokio::time::interval(CHANNEL_SWEEP_INTERVAL);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let removed = broadcaster.cleanup_empty_channels().await;
        if removed > 0 {
            tracing::debug!(removed, "Dropped idle event channels");
        }
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Build CORS layer from configuration.
fn build_cors_layer(allowed_origins: &str) -> Result<CorsLayer, ConfigError> {
    if allowed_origins.trim() == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<HeaderValue>().map_err(|_| ConfigError::InvalidOrigin(s.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
