//! Error types for deferred initialization and per-request delivery.

use std::error::Error as StdError;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Boxed error produced by a resolved handler or a handler factory.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Why initialization did not produce a handler.
///
/// Stored inside the readiness signal and cloned out to every waiter, so the
/// original factory error is shared behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InitError {
    /// The handler factory returned an error.
    #[error(transparent)]
    Factory(Arc<dyn StdError + Send + Sync>),

    /// The handler factory succeeded but its value is not a request handler.
    #[error(
        "the handler factory must produce a request handler, got {produced}; \
         if you are serving an axum app, return the prepared `Router`"
    )]
    Contract {
        /// Description of what the factory produced instead.
        produced: &'static str,
    },

    /// The handler factory panicked.
    #[error("handler factory panicked: {0}")]
    Panicked(String),

    /// Every handle to the proxy was dropped before initialization settled.
    #[error("deferred handler was dropped before initialization settled")]
    Abandoned,
}

impl InitError {
    /// Wrap a factory error, keeping it unmodified.
    pub fn factory(err: impl Into<BoxError>) -> Self {
        let boxed: BoxError = err.into();
        Self::Factory(Arc::from(boxed))
    }
}

/// Error delivered to a single request through the service error channel.
#[derive(Debug, thiserror::Error)]
pub enum DeferredError {
    /// Initialization failed; replayed to every request.
    #[error(transparent)]
    Init(#[from] InitError),

    /// The resolved handler itself returned an error.
    #[error("request handler failed: {0}")]
    Handler(#[source] BoxError),
}

impl DeferredError {
    /// The initialization failure carried by this error, if any.
    pub fn init_error(&self) -> Option<&InitError> {
        match self {
            DeferredError::Init(e) => Some(e),
            DeferredError::Handler(_) => None,
        }
    }
}

impl IntoResponse for DeferredError {
    fn into_response(self) -> Response {
        match self {
            DeferredError::Init(e) => {
                tracing::warn!(error = %e, "Rejecting request, handler failed to initialize");
                (StatusCode::SERVICE_UNAVAILABLE, "Service failed to start").into_response()
            }
            DeferredError::Handler(e) => {
                tracing::error!(error = %e, "Request handler error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
