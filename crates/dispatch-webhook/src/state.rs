use std::sync::Arc;
use std::time::Instant;

use dispatch_jobs::JobStore;

/// Shared state for every handler in this crate (spec §4.4, component
/// C4). Owns only what the ingress itself needs — the `JobStore` is
/// shared by reference with the orchestrator (spec §9, "`jobs` map...
/// shared by reference with the webhook ingress").
pub struct WebhookState {
    pub jobs: Arc<JobStore>,
    pub max_body_bytes: usize,
    pub cleanup_delay_ms: u64,
    started_at: Instant,
}

impl WebhookState {
    pub fn new(jobs: Arc<JobStore>, max_body_bytes: usize, cleanup_delay_ms: u64) -> Self {
        Self {
            jobs,
            max_body_bytes,
            cleanup_delay_ms,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}
