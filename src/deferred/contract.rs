//! Validation of handler factory output.
//!
//! A factory may produce anything that converts into a request handler. The
//! conversion is where a value that cannot serve requests is turned into an
//! initialization failure instead of being stored.

use axum::Router;
use tower::util::{BoxCloneSyncService, ServiceFn};

use super::error::InitError;

/// Conversion from a handler factory's output into the resolved handler.
pub trait IntoRequestHandler {
    /// The service that will receive requests.
    type Handler;

    /// Validate and convert. Returns [`InitError::Contract`] when the value
    /// cannot handle requests.
    fn into_request_handler(self) -> Result<Self::Handler, InitError>;
}

impl IntoRequestHandler for Router {
    type Handler = Router;

    fn into_request_handler(self) -> Result<Router, InitError> {
        Ok(self)
    }
}

impl<F> IntoRequestHandler for ServiceFn<F> {
    type Handler = ServiceFn<F>;

    fn into_request_handler(self) -> Result<Self::Handler, InitError> {
        Ok(self)
    }
}

impl<T, U, E> IntoRequestHandler for BoxCloneSyncService<T, U, E> {
    type Handler = BoxCloneSyncService<T, U, E>;

    fn into_request_handler(self) -> Result<Self::Handler, InitError> {
        Ok(self)
    }
}

/// `None` means the factory finished without anything to serve.
impl<T: IntoRequestHandler> IntoRequestHandler for Option<T> {
    type Handler = T::Handler;

    fn into_request_handler(self) -> Result<Self::Handler, InitError> {
        match self {
            Some(inner) => inner.into_request_handler(),
            None => Err(InitError::Contract { produced: "None" }),
        }
    }
}
