//! NeoRide REST API server.
//!
//! # Configuration
//!
//! - `MONGODB_URI` - Connection string (requests answer with configuration errors when unset)
//! - `MONGODB_DATABASE` - Database name when the URI names none (default: NeoRide)
//! - `PORT` - HTTP port (default: 3001)
//! - `APP_ENV` - Environment label (default: development)
//! - `RUST_LOG` - Log filter (default: info)
//! - `LOG_FORMAT` - Log format: json (default) or text
//! - `METRICS_ENABLED` / `METRICS_PATH` - Prometheus endpoint
//!
//! Variables may also come from a `.env` file in the working directory.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{info, warn};

use neoride_lib::Store;
use neoride_service_shared::{
    init_logging, init_metrics, AppState, LoggingConfig, MetricsConfig, ServiceConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let logging_config = LoggingConfig::from_env();
    init_logging(&logging_config);
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let metrics_config = MetricsConfig::from_env();
    if let Err(e) = init_metrics(&metrics_config) {
        warn!(error = %e, "failed to initialize metrics, continuing without metrics");
    }

    let config = ServiceConfig::from_env();
    info!(
        port = config.port,
        environment = %config.environment,
        mongodb_uri = config.uri_status(),
        "starting NeoRide API"
    );

    let (state, store) = AppState::mongo(config.clone());

    // Warm the connection so the first request does not pay for the dial.
    let warmup = store.clone();
    tokio::spawn(async move {
        match warmup.ping().await {
            Ok(()) => info!("database connection established"),
            Err(e) => warn!(error = %e, reason = e.reason(), "initial database connection failed"),
        }
    });

    let app = neoride_service::router(state, &metrics_config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    store.manager().disconnect().await;
    info!("shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, starting shutdown"),
        _ = terminate => info!("received SIGTERM, starting shutdown"),
    }
}
