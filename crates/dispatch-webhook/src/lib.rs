pub mod auth;
pub mod body_limit;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::WebhookState;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use dispatch_core::ChannelId;
    use dispatch_jobs::{Job, JobResult, JobStore, NewJob, TaskDef};

    use super::*;

    fn build_state(max_body_bytes: usize, cleanup_delay_ms: u64) -> Arc<WebhookState> {
        Arc::new(WebhookState::new(
            Arc::new(JobStore::new()),
            max_body_bytes,
            cleanup_delay_ms,
        ))
    }

    fn insert_job(
        state: &WebhookState,
        token: &str,
        on_complete: Option<dispatch_jobs::OnComplete>,
    ) -> dispatch_core::JobId {
        let id = dispatch_core::JobId::new();
        let job = Job::new(NewJob {
            id: id.clone(),
            job_token: token.to_string(),
            task: TaskDef {
                command: "echo hi".into(),
                ..Default::default()
            },
            channel_id: ChannelId::from("C-1"),
            timeout_ms: 600_000,
            on_message: None,
            on_complete,
        });
        state.jobs.insert(job);
        state.jobs.with_job(&id, |job| job.start("m-1").unwrap());
        id
    }

    async fn post(
        router: axum::Router,
        path: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(path).header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: Value = if bytes.is_empty() {
            json!(null)
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, parsed)
    }

    #[tokio::test]
    async fn logs_round_trip_fires_on_message() {
        let state = build_state(1_048_576, 30_000);
        let id = insert_job(&state, "tok-a", None);
        let router = build_router(state.clone());

        let (status, body) = post(
            router,
            "/webhooks/logs",
            Some("tok-a"),
            json!({"jobId": id.as_str(), "text": "hello"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        let snap = state.jobs.snapshot(&id).unwrap();
        assert_eq!(snap.logs.len(), 1);
        assert_eq!(snap.logs[0].message, "hello");
    }

    #[tokio::test]
    async fn cross_job_token_is_unauthorized() {
        let state = build_state(1_048_576, 30_000);
        let a = insert_job(&state, "tok-a", None);
        let _b = insert_job(&state, "tok-b", None);
        let router = build_router(state.clone());

        let (status, body) = post(
            router,
            "/webhooks/logs",
            Some("tok-b"),
            json!({"jobId": a.as_str(), "text": "hello"}),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
        assert!(state.jobs.snapshot(&a).unwrap().logs.is_empty());
    }

    #[tokio::test]
    async fn status_completed_fires_on_complete_once_and_returns_200() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let state = build_state(1_048_576, 30_000);
        let id = insert_job(
            &state,
            "tok-a",
            Some(Box::new(move |_result: JobResult| {
                count2.fetch_add(1, Ordering::SeqCst);
                panic!("onComplete throwing must not break the response");
            })),
        );
        let router = build_router(state.clone());

        let (status, body) = post(
            router,
            "/webhooks/status",
            Some("tok-a"),
            json!({"jobId": id.as_str(), "status": "completed", "exitCode": 0}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(state.jobs.snapshot(&id).unwrap().status.to_string(), "completed");
    }

    #[tokio::test]
    async fn artifacts_counts_only_valid_entries() {
        let state = build_state(1_048_576, 30_000);
        let id = insert_job(&state, "tok-a", None);
        let router = build_router(state.clone());

        let (status, body) = post(
            router,
            "/webhooks/artifacts",
            Some("tok-a"),
            json!({"jobId": id.as_str(), "artifacts": [
                {"name": "PR", "url": "http://x/1"},
                {"name": "", "url": "http://x/2"},
            ]}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(state.jobs.snapshot(&id).unwrap().artifacts.len(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let state = build_state(1_048_576, 30_000);
        let router = build_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/logs")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let state = build_state(16, 30_000);
        let router = build_router(state);

        let huge = json!({"jobId": "x", "text": "y".repeat(1024)});
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/logs")
            .header("content-type", "application/json")
            .body(Body::from(huge.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn late_append_after_the_grace_window_is_unauthorized() {
        let state = build_state(1_048_576, 20);
        let id = insert_job(&state, "tok-a", None);
        let router = build_router(state.clone());

        let (status, _body) = post(
            router.clone(),
            "/webhooks/status",
            Some("tok-a"),
            json!({"jobId": id.as_str(), "status": "completed", "exitCode": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(state.jobs.snapshot(&id).is_none(), "job must be removed once the grace window elapses");

        let (status, body) = post(
            router,
            "/webhooks/logs",
            Some("tok-a"),
            json!({"jobId": id.as_str(), "text": "too late"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn health_reports_job_count() {
        let state = build_state(1_048_576, 30_000);
        insert_job(&state, "tok-a", None);
        let router = build_router(state);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["jobs"], 1);
    }
}
