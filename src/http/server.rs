//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum Router: readiness probe plus the deferred handler as fallback
//! - Wire up middleware (request ID, tracing, timeout)
//! - Trigger handler initialization once the listener is bound
//! - Serve until shutdown

use std::time::Duration;

use axum::{body::Body, http::Request, response::IntoResponse, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::Service;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::deferred::{BoxError, DeferredHandler};
use crate::http::readiness;
use crate::lifecycle::shutdown;

/// HTTP server fronting a deferred handler.
pub struct AppServer<H> {
    router: Router,
    handler: DeferredHandler<H>,
    config: ServerConfig,
}

impl<H> AppServer<H>
where
    H: Service<Request<Body>> + Clone + Send + Sync + 'static,
    H::Response: IntoResponse + Send + 'static,
    H::Error: Into<BoxError>,
    H::Future: Send + 'static,
{
    /// Create a server. Nothing is initialized until [`AppServer::run`].
    pub fn new(config: ServerConfig, handler: DeferredHandler<H>) -> Self {
        let router = Self::build_router(&config, handler.clone());
        Self {
            router,
            handler,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, handler: DeferredHandler<H>) -> Router {
        let probe = handler.clone();
        Router::new()
            .merge(readiness::routes(move || probe.state()))
            .fallback_service(handler.into_axum_service())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Start handler initialization, then serve on the already-bound listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.handler.init();

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The deferred handler served by this server.
    pub fn handler(&self) -> &DeferredHandler<H> {
        &self.handler
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
