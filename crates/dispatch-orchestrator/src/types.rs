use chrono::{DateTime, Utc};

use dispatch_core::{ChannelId, InstanceId, JobId, SessionId};
use dispatch_jobs::{Artifact, JobResult, OnMessage};

/// Options accepted by `StartInstance` (spec §4.5.1).
#[derive(Debug, Clone, Default)]
pub struct StartInstanceOptions {
    pub persistent: bool,
    pub image: Option<String>,
    pub branch: Option<String>,
}

/// Options accepted by `SendToInstance` (spec §4.5.1). `on_message`, when
/// set, is attached to the Job so every accepted log webhook is relayed
/// live to the caller, in arrival order.
#[derive(Default)]
pub struct SendOptions {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub image: Option<String>,
    pub timeout_ms: Option<u64>,
    pub on_message: Option<OnMessage>,
}

#[derive(Debug, Clone)]
pub struct StartInstanceOutcome {
    pub instance_id: InstanceId,
    pub session_id: SessionId,
    pub sprite_id: Option<String>,
    pub persistent: bool,
}

/// Result of `SendToInstance`, covering both the persistent-stream and
/// one-shot-webhook paths (spec §4.5.3, §4.5.4).
#[derive(Debug, Clone)]
pub struct SendResult {
    pub success: bool,
    pub job_id: Option<JobId>,
    pub responses: Vec<String>,
    pub artifacts: Vec<Artifact>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub persistent: bool,
    pub streamed: bool,
}

impl SendResult {
    pub fn from_job_result(result: JobResult, persistent: bool, streamed: bool) -> Self {
        Self {
            success: result.success(),
            job_id: Some(result.job_id),
            responses: result.responses,
            artifacts: result.artifacts,
            exit_code: result.exit_code,
            error: result.error,
            persistent,
            streamed,
        }
    }

    pub fn failure(job_id: Option<JobId>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            job_id,
            responses: Vec::new(),
            artifacts: Vec::new(),
            exit_code: None,
            error: Some(error.into()),
            persistent: false,
            streamed: false,
        }
    }

    pub fn not_found() -> Self {
        Self::failure(None, "not found")
    }
}

/// A bound chat-channel <-> agent session (spec §4.5, "Instance"). Cloned
/// out of the manager for callers; the manager itself is the only
/// mutator.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub project_dir: String,
    pub channel_id: ChannelId,
    pub session_id: SessionId,
    pub persistent: bool,
    /// Backing Machine id for persistent instances; `None` for one-shot-only
    /// instances (every one-shot Job gets its own Machine instead).
    pub sprite_id: Option<String>,
    pub current_job: Option<JobId>,
    pub created_at: DateTime<Utc>,
}
