//! yadwh-api: webhook gateway for yadwh.
//!
//! Extracts the group name and secret from the request, hands them to the
//! orchestrator, and serializes the replacement containers.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | any | `/{name}` | Secret from `?secret=`, `X-YADWH-Secret`, or the body |
//! | any | `/{name}/{secret}` | Secret in the path |
//! | GET | `/healthz` | Liveness probe |
//!
//! Status codes: 200 with a JSON array of updated containers, 401 when the
//! secret is missing or wrong, 404 for an unknown group, 500 when the
//! runtime cannot list containers.

pub mod handlers;

use axum::Router;
use axum::routing::{any, get};
use yadwh_orchestrator::Orchestrator;

/// Header carrying the webhook secret.
pub const SECRET_HEADER: &str = "X-YADWH-Secret";

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Orchestrator,
}

/// Build the webhook router.
pub fn build_router(orchestrator: Orchestrator) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/{name}", any(handlers::trigger))
        .route("/{name}/{secret}", any(handlers::trigger_with_path_secret))
        .with_state(state)
}
