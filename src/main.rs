//! oauth1-gate binary entry point

use std::net::SocketAddr;

use oauth1_gate::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize metrics
/// 4. Initialize AppState
/// 5. Build Axum router
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration; errors are returned once logging is up
    let loaded = config::AppConfig::load();
    let logging = match &loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => config::LoggingConfig {
            level: "info".to_string(),
            format: std::env::var("OAUTH1_GATE__LOGGING__FORMAT")
                .unwrap_or_else(|_| "pretty".to_string()),
        },
    };

    // 2. Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.default_directives().into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting oauth1-gate...");

    let config = loaded.inspect_err(|e| tracing::error!(error = %e, "Invalid configuration"))?;
    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        level = %config.logging.level,
        "Configuration loaded"
    );

    // 3. Initialize metrics
    oauth1_gate::metrics::init_metrics();

    // 4. Initialize application state
    let state = AppState::new(config.clone())?;

    // 5. Build Axum router
    let app = oauth1_gate::build_router(state);

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", config.server.base_url());

    // Peer addresses feed the gate's host resolution
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
