use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::WebhookState;

/// Buffers the request body up to `max_body_bytes`, storing the result
/// as a `Bytes` extension so handlers never re-read it. A body that
/// overflows the cap is drained and rejected with 413 before any
/// handler runs — the "running total across received chunks" half of
/// the spec's body-size limit (§4.4); the early, declared-Content-Length
/// rejection is handled by the caller via `rejects_by_content_length`.
pub async fn enforce_body_limit(
    State(state): State<Arc<WebhookState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(len) = declared_content_length(&request) {
        if len > state.max_body_bytes {
            return payload_too_large();
        }
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => return payload_too_large(),
    };

    let mut request = Request::from_parts(parts, Body::empty());
    request.extensions_mut().insert(bytes);
    next.run(request).await
}

fn declared_content_length(request: &Request) -> Option<usize> {
    request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn payload_too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(json!({"error": "Payload too large"})),
    )
        .into_response()
}

pub type RawBody = Bytes;
