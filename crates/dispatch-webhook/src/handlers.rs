use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use dispatch_core::JobId;
use dispatch_jobs::{AuthOutcome, JobResult, LogLevel, OnComplete};

use crate::auth::bearer_token;
use crate::body_limit::RawBody;
use crate::state::WebhookState;

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Unauthorized"})),
    )
        .into_response()
}

fn ok(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// GET /health (spec §4.4).
pub async fn health_handler(State(state): State<Arc<WebhookState>>) -> Response {
    ok(json!({
        "status": "healthy",
        "jobs": state.jobs.len(),
        "uptime": state.uptime_seconds(),
    }))
}

fn parse_body(body: &RawBody) -> Result<Value, Response> {
    serde_json::from_slice(body).map_err(|_| bad_request("Invalid JSON"))
}

/// Fire a taken `onComplete` outside of the job-store lock, isolating
/// the webhook response from a panicking callback (spec §4.4 "Callback
/// isolation").
fn fire_on_complete(job_id: &JobId, cb: OnComplete, result: JobResult) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(result))) {
        warn!(job_id = %job_id, panic = ?payload, "onComplete callback panicked");
    }
}

fn schedule_cleanup(state: Arc<WebhookState>, job_id: JobId, delay_ms: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        state.jobs.remove(&job_id);
    });
}

/// POST /webhooks/logs (spec §4.4).
pub async fn logs_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    Extension(body): Extension<RawBody>,
) -> Response {
    let payload = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let job_id = match payload.get("jobId").and_then(Value::as_str) {
        Some(s) => JobId::from(s),
        None => return bad_request("Missing jobId or text"),
    };
    let text = match payload.get("text").and_then(Value::as_str) {
        Some(s) => s,
        None => return bad_request("Missing jobId or text"),
    };

    let token = bearer_token(&headers).unwrap_or("");
    if state.jobs.authenticate(&job_id, token) != AuthOutcome::Authenticated {
        return unauthorized();
    }

    let accepted = state.jobs.with_job(&job_id, |job| {
        let line = job.append_log(text, LogLevel::Info);
        job.notify_message(&line);
    });
    if accepted.is_none() {
        // Authenticated a moment ago, then removed (e.g. reaper race).
        return unauthorized();
    }

    ok(json!({"ok": true}))
}

/// POST /webhooks/status (spec §4.4).
pub async fn status_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    Extension(body): Extension<RawBody>,
) -> Response {
    let payload = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let job_id = match payload.get("jobId").and_then(Value::as_str) {
        Some(s) => JobId::from(s),
        None => return bad_request("Missing jobId or text"),
    };
    let status = match payload.get("status").and_then(Value::as_str) {
        Some(s) => s,
        None => return bad_request("Missing jobId or text"),
    };
    let exit_code = payload.get("exitCode").and_then(Value::as_i64).map(|v| v as i32);
    let error = payload
        .get("error")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let token = bearer_token(&headers).unwrap_or("");
    if state.jobs.authenticate(&job_id, token) != AuthOutcome::Authenticated {
        return unauthorized();
    }

    let terminal = matches!(status, "completed" | "failed");

    let completion = state.jobs.with_job(&job_id, |job| match status {
        "running" => {
            job.touch_activity();
            None
        }
        "completed" => {
            if job.complete(exit_code.unwrap_or(0)) {
                job.take_on_complete().map(|cb| (cb, job.result()))
            } else {
                None
            }
        }
        "failed" => {
            let message = error.clone().unwrap_or_else(|| "Sprite reported failure".into());
            if job.fail(message, Some(exit_code.unwrap_or(1))) {
                job.take_on_complete().map(|cb| (cb, job.result()))
            } else {
                None
            }
        }
        // Unknown status values are ignored for forward compatibility
        // with future reporter versions (spec §4.4).
        _ => None,
    });

    if let Some(Some((cb, result))) = completion {
        fire_on_complete(&job_id, cb, result);
    }

    if terminal {
        schedule_cleanup(state.clone(), job_id, state.cleanup_delay_ms);
    }

    ok(json!({"ok": true}))
}

/// POST /webhooks/artifacts (spec §4.4).
pub async fn artifacts_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    Extension(body): Extension<RawBody>,
) -> Response {
    let payload = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let job_id = match payload.get("jobId").and_then(Value::as_str) {
        Some(s) => JobId::from(s),
        None => return bad_request("Missing jobId or artifacts array"),
    };
    let artifacts = match payload.get("artifacts").and_then(Value::as_array) {
        Some(a) => a,
        None => return bad_request("Missing jobId or artifacts array"),
    };

    let token = bearer_token(&headers).unwrap_or("");
    if state.jobs.authenticate(&job_id, token) != AuthOutcome::Authenticated {
        return unauthorized();
    }

    let count = state.jobs.with_job(&job_id, |job| {
        let mut accepted = 0usize;
        for entry in artifacts {
            let name = entry.get("name").and_then(Value::as_str).unwrap_or("");
            let url = entry.get("url").and_then(Value::as_str).unwrap_or("");
            let artifact_type = entry
                .get("type")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
            if job.add_artifact(name, url, artifact_type) {
                accepted += 1;
            }
        }
        accepted
    });

    match count {
        Some(count) => ok(json!({"ok": true, "count": count})),
        None => unauthorized(),
    }
}
