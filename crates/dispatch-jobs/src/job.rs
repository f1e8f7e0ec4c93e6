use chrono::{DateTime, Utc};

use dispatch_core::{ChannelId, JobId};

use crate::error::{JobsError, Result};
use crate::types::{Artifact, JobResult, JobSnapshot, JobStatus, LogLevel, LogLine, TaskDef};

/// Called for every log line accepted for this Job, in arrival order.
pub type OnMessage = Box<dyn Fn(&str) + Send + Sync>;

/// Called exactly once, on whichever terminal path wins the completion
/// race (webhook, timeout, stale reaper, or spawn error — spec §3
/// invariant 2). `FnOnce` makes "fires at most once" a type-level
/// guarantee once combined with [`Job::take_on_complete`]'s `Option::take`.
pub type OnComplete = Box<dyn FnOnce(JobResult) + Send>;

/// Arguments needed to construct a new [`Job`] (spec §3, §4.5.4 step 2).
pub struct NewJob {
    pub id: JobId,
    pub job_token: String,
    pub task: TaskDef,
    pub channel_id: ChannelId,
    pub timeout_ms: u64,
    pub on_message: Option<OnMessage>,
    pub on_complete: Option<OnComplete>,
}

/// The Job data entity (spec §4.1, component C1).
///
/// `job_token` is a private field: it is never exposed by [`Job::snapshot`]
/// or by any `Display`/log-field implementation on this type (spec §3
/// invariant 4).
pub struct Job {
    pub id: JobId,
    job_token: String,
    pub status: JobStatus,
    pub task: TaskDef,
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
    on_message: Option<OnMessage>,
    on_complete: Option<OnComplete>,
}

impl Job {
    pub fn new(args: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: args.id,
            job_token: args.job_token,
            status: JobStatus::Queued,
            task: args.task,
            channel_id: args.channel_id,
            machine_id: None,
            logs: Vec::new(),
            artifacts: Vec::new(),
            created_at: now,
            started_at: None,
            completed_at: None,
            last_activity_at: now,
            timeout_ms: args.timeout_ms,
            exit_code: None,
            error: None,
            on_message: args.on_message,
            on_complete: args.on_complete,
        }
    }

    /// The bearer secret used to authenticate webhook calls for this Job.
    /// Deliberately not `Display`/`Debug`-visible beyond this accessor —
    /// callers must opt in to touching it.
    pub fn token(&self) -> &str {
        &self.job_token
    }

    /// Transition `Queued -> Running`, recording the spawned Machine id.
    /// Only valid from `Queued` (spec §4.1).
    pub fn start(&mut self, machine_id: impl Into<String>) -> Result<()> {
        if self.status != JobStatus::Queued {
            return Err(JobsError::InvalidTransition {
                from: self.status.to_string(),
                to: JobStatus::Running.to_string(),
            });
        }
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.machine_id = Some(machine_id.into());
        self.started_at = Some(now);
        self.last_activity_at = now;
        Ok(())
    }

    /// Transition `Running -> Completed`. Idempotent: a second call (from
    /// any source — webhook, timeout, reaper) is a silent no-op and
    /// returns `false` (spec §4.1, §8 invariant 1).
    pub fn complete(&mut self, exit_code: i32) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.finish(JobStatus::Completed, Some(exit_code), None)
    }

    /// Transition `{Queued, Running} -> Failed`. Valid from `Queued` too —
    /// a Job can fail before it ever starts (e.g. `SpawnOneShot` itself
    /// errors, spec §4.5.4 step 6), and that failure must still be
    /// observable: a Job stuck `Queued` forever is invisible to the stale
    /// reaper, since `IsTimedOut` only fires for `Running` (spec §4.1).
    /// Idempotent once terminal, same contract as [`Job::complete`].
    pub fn fail(&mut self, error: impl Into<String>, exit_code: Option<i32>) -> bool {
        if !matches!(self.status, JobStatus::Queued | JobStatus::Running) {
            return false;
        }
        self.finish(JobStatus::Failed, exit_code, Some(error.into()))
    }

    fn finish(&mut self, to: JobStatus, exit_code: Option<i32>, error: Option<String>) -> bool {
        let now = Utc::now();
        self.status = to;
        self.exit_code = exit_code;
        self.error = error;
        self.completed_at = Some(now);
        self.last_activity_at = now;
        true
    }

    /// Bump `last_activity_at` without otherwise changing state — the
    /// `"running"` status webhook is a heartbeat, not a transition (spec
    /// §4.4 "Status transitions the webhook accepts").
    pub fn touch_activity(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Append a log line and bump `last_activity_at` (spec §3 invariant 5).
    /// Returns the appended message so the caller can forward it to
    /// `onMessage` outside of any lock it might be holding.
    pub fn append_log(&mut self, message: impl Into<String>, level: LogLevel) -> String {
        let message = message.into();
        self.last_activity_at = Utc::now();
        self.logs.push(LogLine {
            timestamp: self.last_activity_at,
            level,
            message: message.clone(),
        });
        message
    }

    /// Add an artifact whose `name` and `url` are both non-empty (spec
    /// §4.4 `/webhooks/artifacts`). Returns `false` and does nothing
    /// otherwise. Also bumps `last_activity_at`.
    pub fn add_artifact(&mut self, name: impl Into<String>, url: impl Into<String>, artifact_type: Option<String>) -> bool {
        let name = name.into();
        let url = url.into();
        if name.is_empty() || url.is_empty() {
            return false;
        }
        self.last_activity_at = Utc::now();
        self.artifacts.push(Artifact {
            name,
            url,
            artifact_type,
            added_at: self.last_activity_at,
        });
        true
    }

    /// `true` iff `status == Running` and inactivity has exceeded
    /// `timeout_ms` (spec §4.1).
    pub fn is_timed_out_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let elapsed = (now - self.last_activity_at).num_milliseconds();
        elapsed > self.timeout_ms as i64
    }

    pub fn is_timed_out(&self) -> bool {
        self.is_timed_out_at(Utc::now())
    }

    /// Wall-clock duration from `started_at` to `completed_at` (or `now`
    /// if still running). `None` if the Job never started.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some(end - start)
    }

    /// One-line human summary, safe to log (no token).
    pub fn summary(&self) -> String {
        format!(
            "job {} [{}] cmd={:?} logs={} artifacts={}",
            self.id,
            self.status,
            self.task.command,
            self.logs.len(),
            self.artifacts.len()
        )
    }

    /// Redacted introspection view (spec §4.1 `Serialize`).
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            status: self.status,
            repo: self.task.repo.clone(),
            branch: self.task.branch.clone(),
            image: self.task.image.clone(),
            command: self.task.command.clone(),
            channel_id: self.channel_id.clone(),
            machine_id: self.machine_id.clone(),
            logs: self.logs.clone(),
            artifacts: self.artifacts.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            last_activity_at: self.last_activity_at,
            timeout_ms: self.timeout_ms,
            exit_code: self.exit_code,
            error: self.error.clone(),
        }
    }

    /// Rehydrate a Job from a previously-serialized [`JobSnapshot`] for
    /// introspection only — never for resumption. Callbacks stay absent
    /// and the token is blank, so the result can never authenticate a
    /// webhook nor fire a completion continuation (spec §4.1).
    pub fn from_snapshot(snapshot: JobSnapshot) -> Self {
        Self {
            id: snapshot.id,
            job_token: String::new(),
            status: snapshot.status,
            task: TaskDef {
                repo: snapshot.repo,
                branch: snapshot.branch,
                image: snapshot.image,
                command: snapshot.command,
            },
            channel_id: snapshot.channel_id,
            machine_id: snapshot.machine_id,
            logs: snapshot.logs,
            artifacts: snapshot.artifacts,
            created_at: snapshot.created_at,
            started_at: snapshot.started_at,
            completed_at: snapshot.completed_at,
            last_activity_at: snapshot.last_activity_at,
            timeout_ms: snapshot.timeout_ms,
            exit_code: snapshot.exit_code,
            error: snapshot.error,
            on_message: None,
            on_complete: None,
        }
    }

    /// Build the [`JobResult`] view handed to `onComplete` / returned by
    /// the orchestrator's completion race. Snapshots `artifacts` at the
    /// moment it's called — artifacts arriving after this point are
    /// visible on the Job but not retroactively added to an
    /// already-resolved result (spec §9, "Open question — artifact
    /// ordering vs. status").
    pub fn result(&self) -> JobResult {
        JobResult {
            job_id: self.id.clone(),
            status: self.status,
            responses: self.logs.iter().map(|l| l.message.clone()).collect(),
            artifacts: self.artifacts.clone(),
            exit_code: self.exit_code,
            error: self.error.clone(),
        }
    }

    /// Invoke `onMessage` if present, isolating the caller from a panic
    /// inside the callback (spec §4.4 "Callback isolation").
    pub fn notify_message(&self, text: &str) {
        if let Some(cb) = &self.on_message {
            if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(text))) {
                tracing::warn!(job_id = %self.id, panic = ?payload, "onMessage callback panicked");
            }
        }
    }

    /// Take ownership of `onComplete` (if not already taken), so the
    /// caller can fire it exactly once outside of any lock.
    pub fn take_on_complete(&mut self) -> Option<OnComplete> {
        self.on_complete.take()
    }

    pub fn has_on_complete(&self) -> bool {
        self.on_complete.is_some()
    }
}
