//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize metrics exporter and server.
pub fn init_metrics(addr: SocketAddr) {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus recorder");

    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Record one relayed request/response cycle.
pub fn record_cycle(method: &str, status: u16, backend: &str, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];

    counter!("proxy_cycles_total", &labels).increment(1);
    histogram!("proxy_cycle_duration_seconds", &labels).record(started.elapsed().as_secs_f64());
}

/// Record a connection promoted to a byte pipe.
pub fn record_upgrade(backend: &str) {
    counter!("proxy_upgrades_total", "backend" => backend.to_string()).increment(1);
}

/// Record a failed cycle by error kind.
pub fn record_error(kind: &'static str) {
    counter!("proxy_cycle_errors_total", "kind" => kind).increment(1);
}
