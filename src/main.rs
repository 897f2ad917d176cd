use dwlr_api::config::Config;
use dwlr_api::loader::Loader;
use dwlr_api::query::QueryEngine;
use dwlr_api::server::{self, ApiState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dwlr_api=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Groundwater Monitoring API starting...");

    // Load configuration
    let config = Config::load_default().map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {}\n\n\
             Make sure:\n\
             1. config/config.yaml exists (or DWLR_CONFIG points at a config file)\n\
             2. All required environment variables are set (check .env.example)\n\
             3. Create a .env file if needed",
            e
        )
    })?;
    info!("Configuration loaded");

    // Load the dataset once; it is never modified afterwards
    let (dataset, stats) = Loader::load(&config.dataset).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load dataset: {}\n\n\
             Path: {}\n\
             Format: {:?}\n\n\
             Common fixes:\n\
             1. Check dataset.path is correct relative to the working directory\n\
             2. Set dataset.format explicitly if the extension is unusual\n\
             3. Check dataset.fields matches the column/field names in the file",
            e,
            config.dataset.path.display(),
            config.dataset.format
        )
    })?;
    info!(
        "Serving {} stations ({} readings, failure rate {:.1}%)",
        dataset.len(),
        dataset.reading_count(),
        stats.failure_rate * 100.0
    );

    let engine = QueryEngine::new(Arc::new(dataset), config.dataset.fields.clone());
    let app = server::router(ApiState::new(engine), config.server.cors_permissive);

    let bind_address = config.server.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", bind_address, e))?;

    // Set up shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    server::run_server(listener, app, shutdown_rx)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Groundwater Monitoring API shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                // Fall back to Ctrl+C only
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
