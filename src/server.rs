//! Proxy server loop.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Run one task per connection: parse heads, route, relay cycles
//! - Keep the inbound connection alive across cycles until one demands
//!   close
//! - Map errors raised before any response byte to synthetic replies

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::net::{ClientConn, ConnectionPermit, Listener, ListenerError, ReadHeadError};
use crate::observability::metrics;
use crate::relay::{self, Disposition, RelayConfig};
use crate::routing::Router;

/// The reverse proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    router: Arc<Router>,
}

impl ProxyServer {
    /// Build the server from a validated configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, std::net::AddrParseError> {
        let router = Arc::new(Router::from_config(&config)?);
        Ok(Self { config, router })
    }

    /// Accept and serve connections until the shutdown signal fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let relay_cfg = RelayConfig {
            connect: self.config.timeouts.connect(),
            continue_window: self.config.timeouts.continue_window(),
            pipe_idle: self.config.timeouts.pipe_idle(),
        };
        let max_head_bytes = self.config.limits.max_header_bytes;

        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    return Ok(());
                }
                accepted = listener.accept() => accepted?,
            };
            let (stream, peer, permit) = accepted;
            let router = Arc::clone(&self.router);

            tokio::spawn(async move {
                let conn = ClientConn::new(stream, peer);
                handle_connection(conn, router, relay_cfg, max_head_bytes, permit).await;
            });
        }
    }
}

async fn handle_connection(
    mut conn: ClientConn,
    router: Arc<Router>,
    relay_cfg: RelayConfig,
    max_head_bytes: usize,
    _permit: ConnectionPermit,
) {
    loop {
        let mut req = match conn.read_request(max_head_bytes).await {
            Ok(Some(req)) => req,
            Ok(None) => break,
            Err(ReadHeadError::Head(e)) => {
                tracing::debug!(peer = %conn.peer(), error = %e, "Rejecting unparsable request");
                let _ = conn.send_simple(400, "Bad Request", "malformed request head").await;
                break;
            }
            Err(e) => {
                tracing::debug!(peer = %conn.peer(), error = %e, "Client read failed");
                break;
            }
        };

        let span = tracing::info_span!(
            "cycle",
            id = %Uuid::new_v4(),
            peer = %conn.peer(),
            method = %req.method,
            path = %req.target,
        );

        let host = req
            .headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let Some(backend) = router.route(host.as_deref(), &req.target) else {
            let _enter = span.enter();
            tracing::warn!("No route matched");
            let _ = conn
                .send_simple(404, "Not Found", "no matching route")
                .await;
            break;
        };

        let started = std::time::Instant::now();
        let backend_name = backend.name.clone();
        let outcome = relay::run_cycle(&mut conn, &mut req, backend, &relay_cfg)
            .instrument(span.clone())
            .await;
        let _enter = span.enter();

        match outcome {
            Ok(Disposition::Relayed { status, close }) => {
                tracing::info!(status = %status, elapsed_ms = started.elapsed().as_millis() as u64, "Relayed");
                metrics::record_cycle(req.method.as_str(), status.as_u16(), &backend_name, started);
                if close {
                    break;
                }
            }
            Ok(Disposition::Upgraded) => {
                tracing::info!("Upgraded connection finished");
                metrics::record_upgrade(&backend_name);
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Relay cycle failed");
                metrics::record_error(e.kind());
                if !conn.response_started() {
                    if let Some(status) = e.synthetic_status() {
                        let reason = status.canonical_reason().unwrap_or("Error");
                        let _ = conn
                            .send_simple(status.as_u16(), reason, &e.to_string())
                            .await;
                    }
                }
                break;
            }
        }
    }

    conn.shutdown().await;
}
