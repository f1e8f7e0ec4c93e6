use std::sync::Arc;

use axum::Router;

use dispatch_core::config::DispatchConfig;
use dispatch_jobs::JobStore;
use dispatch_machines::MachinesClient;
use dispatch_orchestrator::InstanceManager;
use dispatch_webhook::WebhookState;

/// Everything the gateway binary wires together at boot: the shared
/// `JobStore`, the orchestrator that drives `StartInstance`/`SendToInstance`
/// (invoked by whatever chat-command layer a deployment plugs in — out of
/// scope here, same as the teacher's `channel_senders` registry is filled
/// in by adapter crates this binary doesn't itself contain), and the
/// webhook ingress that reports back into that same `JobStore`.
pub struct AppState {
    pub config: DispatchConfig,
    pub jobs: Arc<JobStore>,
    pub instances: Arc<InstanceManager>,
}

impl AppState {
    pub fn new(config: DispatchConfig, machines: Arc<dyn MachinesClient>, job_token_secret: Vec<u8>) -> Self {
        let jobs = Arc::new(JobStore::new());
        let token_gen = dispatch_machines::JobTokenGenerator::new(job_token_secret);
        let webhook_base_url = format!("http://{}:{}", config.gateway.bind, config.gateway.port);
        let instances = Arc::new(InstanceManager::new(
            jobs.clone(),
            machines,
            token_gen,
            webhook_base_url,
            config.jobs.default_timeout_ms,
            config.jobs.cleanup_delay_ms,
        ));
        Self { config, jobs, instances }
    }
}

/// Assemble the full Axum router (spec §4.4's ingress, the only HTTP
/// surface this binary exposes today).
pub fn build_router(state: &AppState) -> Router {
    let webhook_state = Arc::new(WebhookState::new(
        state.jobs.clone(),
        state.config.gateway.max_body_bytes,
        state.config.jobs.cleanup_delay_ms,
    ));
    dispatch_webhook::build_router(webhook_state)
}
