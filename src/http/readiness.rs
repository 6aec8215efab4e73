//! Readiness probe endpoint.
//!
//! Answers from outside the deferred handler so that orchestrators can poll
//! it while the handler is still initializing.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::deferred::HandlerState;

/// Path the probe is mounted at.
pub const READY_PATH: &str = "/_ready";

type StateProbe = Arc<dyn Fn() -> HandlerState + Send + Sync>;

/// Router serving the probe, reading state from `probe` on every request.
pub fn routes<F>(probe: F) -> Router
where
    F: Fn() -> HandlerState + Send + Sync + 'static,
{
    let probe: StateProbe = Arc::new(probe);
    Router::new()
        .route(READY_PATH, get(readiness))
        .with_state(probe)
}

async fn readiness(State(probe): State<StateProbe>) -> (StatusCode, Json<Value>) {
    let state = probe();
    let status = match state {
        HandlerState::Ready => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "state": state.as_str() })))
}
