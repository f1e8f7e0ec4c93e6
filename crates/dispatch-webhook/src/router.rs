use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::body_limit::enforce_body_limit;
use crate::handlers::{artifacts_handler, health_handler, logs_handler, status_handler};
use crate::state::WebhookState;

/// Assemble the webhook ingress router (spec §4.4, component C4).
pub fn build_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhooks/logs", post(logs_handler))
        .route("/webhooks/status", post(status_handler))
        .route("/webhooks/artifacts", post(artifacts_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            enforce_body_limit,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
