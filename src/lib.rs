//! Bind the listener first, build the request handler later.
//!
//! A [`DeferredHandler`] is registered with the HTTP server before its real
//! handler exists. Requests that arrive while the handler factory is still
//! running wait for it; once it finishes they are dispatched directly.

pub mod config;
pub mod deferred;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod site;

pub use config::ServerConfig;
pub use deferred::{DeferredError, DeferredHandler, HandlerState, InitError, ReadySignal};
pub use http::AppServer;
pub use lifecycle::Shutdown;
