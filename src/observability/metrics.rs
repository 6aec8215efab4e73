//! Metrics collection and exposition.
//!
//! # Metrics
//! - `deferred_requests_total` (counter): requests by `path` (`fast`, `slow`)
//! - `deferred_requests_waiting` (gauge): requests suspended on the readiness signal
//! - `deferred_init_total` (counter): initialization attempts by `outcome`
//! - `deferred_init_duration_seconds` (histogram): handler factory run time

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a request entering the proxy on the given dispatch path.
pub fn record_dispatch(path: &'static str) {
    ::metrics::counter!("deferred_requests_total", "path" => path).increment(1);
}

/// Record the outcome of the handler factory.
pub fn record_init(outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!("deferred_init_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("deferred_init_duration_seconds").record(elapsed.as_secs_f64());
}

/// Tracks one request waiting for initialization.
/// Decrements the waiting gauge when dropped, including on cancellation.
#[derive(Debug)]
pub struct WaitingGuard {
    _private: (),
}

impl WaitingGuard {
    pub fn new() -> Self {
        ::metrics::gauge!("deferred_requests_waiting").increment(1.0);
        Self { _private: () }
    }
}

impl Default for WaitingGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        ::metrics::gauge!("deferred_requests_waiting").decrement(1.0);
    }
}
