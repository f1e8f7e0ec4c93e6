use std::collections::HashMap;
use std::sync::Mutex;

use subtle::ConstantTimeEq;

use dispatch_core::JobId;

use crate::job::Job;
use crate::types::JobSnapshot;

/// Shared, mutex-guarded `jobId -> Job` map (spec §9, "a map guarded by a
/// single mutex... sharded locking is overkill at operator scale").
///
/// Owned by whoever assembles the application state and handed to both
/// the webhook ingress (C4) and the instance manager (C5) by reference —
/// the same sharing the teacher does with `SessionManager`/`jobs` inside
/// `Arc<AppState>`.
#[derive(Default)]
pub struct JobStore {
    inner: Mutex<HashMap<JobId, Job>>,
}

/// Outcome of [`JobStore::authenticate`] — deliberately uninformative on
/// failure, so a caller can't distinguish "unknown job" from "wrong
/// token" (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    Unauthorized,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, job: Job) {
        let mut guard = self.inner.lock().expect("job store mutex poisoned");
        guard.insert(job.id.clone(), job);
    }

    pub fn remove(&self, id: &JobId) -> Option<Job> {
        let mut guard = self.inner.lock().expect("job store mutex poisoned");
        guard.remove(id)
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("job store mutex poisoned");
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against the job under lock and return its result. The
    /// primary mutation entry point for both webhook handlers and the
    /// orchestrator — keeps the critical section to plain field updates,
    /// never an arbitrary callback invocation.
    pub fn with_job<R>(&self, id: &JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut guard = self.inner.lock().expect("job store mutex poisoned");
        guard.get_mut(id).map(f)
    }

    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        let guard = self.inner.lock().expect("job store mutex poisoned");
        guard.get(id).map(Job::snapshot)
    }

    pub fn list_snapshots(&self) -> Vec<JobSnapshot> {
        let guard = self.inner.lock().expect("job store mutex poisoned");
        guard.values().map(Job::snapshot).collect()
    }

    /// Constant-time auth check: `jobs[jobId] != nil && job.jobToken ==
    /// token` (spec §4.4, §8 testable property 4 — cross-token rejection).
    /// Never reveals whether the job exists.
    pub fn authenticate(&self, id: &JobId, token: &str) -> AuthOutcome {
        let guard = self.inner.lock().expect("job store mutex poisoned");
        match guard.get(id) {
            Some(job) if job.token().as_bytes().ct_eq(token.as_bytes()).into() => {
                AuthOutcome::Authenticated
            }
            _ => AuthOutcome::Unauthorized,
        }
    }

    /// Ids of every Job whose `IsTimedOut()` is true right now — used by
    /// the stale reaper (spec §4.5.5).
    pub fn timed_out_ids(&self) -> Vec<JobId> {
        let guard = self.inner.lock().expect("job store mutex poisoned");
        guard
            .values()
            .filter(|j| j.is_timed_out())
            .map(|j| j.id.clone())
            .collect()
    }
}
