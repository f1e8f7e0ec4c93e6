use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use dispatch_core::{ChannelId, JobId};

/// Job lifecycle status (spec §3). Transitions form a DAG with no
/// back-edges: `Queued -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Severity of a single [`LogLine`]. The webhook wire format (spec §6)
/// carries only `text`, so accepted webhook logs always use `Info`;
/// the `Info`/`Warn`/`Error` split exists for internally-generated log
/// lines (e.g. the "Job started" notification in spec §4.5.4 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// A single ordered log line appended to a Job (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// A single artifact reported for a Job (spec §3). Names are not unique —
/// a reporter may emit the same artifact name more than once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub artifact_type: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Task definition supplied at Job creation (spec §3: `repo`, `branch`,
/// `image`, `command`).
#[derive(Debug, Clone, Default)]
pub struct TaskDef {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub image: Option<String>,
    pub command: String,
}

/// Owned, callback-free snapshot of a terminal Job, handed to `onComplete`
/// and to the orchestrator's completion race (spec §4.5.4's
/// `{success, responses, jobId, artifacts, exitCode}` result shape).
///
/// Taking this by value instead of passing `&Job` sidesteps holding the
/// job-store lock for the duration of an arbitrary callback — the
/// systems-language realization of the source's callback-over-closures
/// design (spec §9, "Callback graph vs. promise orchestration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub responses: Vec<String>,
    pub artifacts: Vec<Artifact>,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// Redacted, introspection-only view of a Job (spec §4.1 `Serialize`).
/// Omits `jobToken`, `onMessage`, and `onComplete` per spec §3 invariant 4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub image: Option<String>,
    pub command: String,
    pub channel_id: ChannelId,
    pub machine_id: Option<String>,
    pub logs: Vec<LogLine>,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub timeout_ms: u64,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}
