//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Deferred handler, HTTP stack, startup:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (dispatch counters, waiting gauge, init histogram)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Metrics go through the `metrics` facade; without an installed recorder
//!   they are no-ops, so library users pay nothing
//! - Log filter comes from `RUST_LOG` first, config second

pub mod logging;
pub mod metrics;
