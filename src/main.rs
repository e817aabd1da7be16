use std::path::PathBuf;

use strait::config::{load_config, ProxyConfig};
use strait::lifecycle::Shutdown;
use strait::net::Listener;
use strait::observability;
use strait::server::ProxyServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults when no file is given)
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&PathBuf::from(path))?,
        None => ProxyConfig::default(),
    };

    observability::logging::init(&config.observability.log_level);

    tracing::info!("strait v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        connect_ms = config.timeouts.connect_ms,
        continue_secs = config.timeouts.continue_secs,
        pipe_idle_secs = config.timeouts.pipe_idle_secs,
        routes = config.routes.len(),
        backends = config.backends.len(),
        "Configuration loaded"
    );

    // Metrics exporter
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // Bind the bounded listener
    let listener = Listener::bind(&config.listener).await?;

    // Ctrl-C triggers graceful shutdown
    let shutdown = Shutdown::new();
    let trigger = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown;
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
            }
        }
    });

    let server = ProxyServer::new(config)?;
    server.run(listener, trigger).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
