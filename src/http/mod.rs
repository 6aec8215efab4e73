//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum::serve)
//!     → server.rs (request ID, tracing, timeout layers)
//!     → readiness.rs (GET /_ready, answered directly)
//!     → everything else: deferred handler (waits, or dispatches to the site)
//! ```

pub mod readiness;
pub mod server;

pub use server::AppServer;
