use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use dispatch_core::{ChannelId, InstanceId, JobId, SessionId};
use dispatch_command::{build_shell_command, AgentKind, BuildOptions};
use dispatch_jobs::{Job, JobResult, JobSnapshot, JobStore, LogLevel, NewJob, OnComplete, TaskDef};
use dispatch_machines::{
    ExecOptions, JobTokenGenerator, MachinesClient, SpawnOneShotRequest, SpawnPersistentRequest,
};

use crate::error::{OrchestratorError, Result};
use crate::types::{Instance, SendOptions, SendResult, StartInstanceOptions, StartInstanceOutcome};

/// Owns `instances` and (by reference) `jobs` — the two shared mutable
/// maps named in spec §4.5/§9. Shared as `Arc<InstanceManager>` between
/// whatever drives `StartInstance`/`SendToInstance` (e.g. a chat command
/// dispatcher) and the stale reaper's background task.
pub struct InstanceManager {
    instances: Mutex<HashMap<InstanceId, Instance>>,
    jobs: Arc<JobStore>,
    machines: Arc<dyn MachinesClient>,
    token_gen: JobTokenGenerator,
    webhook_base_url: String,
    default_timeout_ms: u64,
    cleanup_delay_ms: u64,
}

impl InstanceManager {
    pub fn new(
        jobs: Arc<JobStore>,
        machines: Arc<dyn MachinesClient>,
        token_gen: JobTokenGenerator,
        webhook_base_url: impl Into<String>,
        default_timeout_ms: u64,
        cleanup_delay_ms: u64,
    ) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            jobs,
            machines,
            token_gen,
            webhook_base_url: webhook_base_url.into(),
            default_timeout_ms,
            cleanup_delay_ms,
        }
    }

    /// Schedule removal of `job_id` from the job store after the grace
    /// window, mirroring `dispatch-webhook`'s `schedule_cleanup` for
    /// terminal transitions driven from inside the orchestrator itself
    /// (spawn failure, internal timeout) rather than via a webhook call —
    /// without one of these, such jobs, and their still-live `jobToken`,
    /// would linger forever instead of 401'ing past the grace window
    /// (spec §8 testable property 8).
    fn schedule_cleanup(&self, job_id: JobId) {
        let jobs = self.jobs.clone();
        let delay = Duration::from_millis(self.cleanup_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            jobs.remove(&job_id);
        });
    }

    // ---- 4.5.1 public operations -----------------------------------

    /// `StartInstance` (spec §4.5.1). Fails if `id` is already registered.
    pub async fn start_instance(
        &self,
        id: InstanceId,
        project_dir: impl Into<String>,
        channel_id: ChannelId,
        opts: StartInstanceOptions,
    ) -> Result<StartInstanceOutcome> {
        if self.instances.lock().expect("instances mutex poisoned").contains_key(&id) {
            return Err(OrchestratorError::InstanceExists(id.to_string()));
        }

        let session_id = SessionId::new();
        let sprite_id = if opts.persistent {
            let request = SpawnPersistentRequest {
                repo: None,
                branch: opts.branch.clone(),
                image: opts.image.clone(),
                env: HashMap::new(),
            };
            Some(self.machines.spawn_persistent(&request).await?.id)
        } else {
            None
        };

        let instance = Instance {
            id: id.clone(),
            project_dir: project_dir.into(),
            channel_id,
            session_id: session_id.clone(),
            persistent: opts.persistent,
            sprite_id: sprite_id.clone(),
            current_job: None,
            created_at: Utc::now(),
        };

        {
            let mut instances = self.instances.lock().expect("instances mutex poisoned");
            if instances.contains_key(&id) {
                drop(instances);
                if let Some(machine_id) = &sprite_id {
                    let _ = self.machines.destroy(machine_id).await;
                }
                return Err(OrchestratorError::InstanceExists(id.to_string()));
            }
            instances.insert(id.clone(), instance);
        }

        info!(instance_id = %id, persistent = opts.persistent, "instance started");
        Ok(StartInstanceOutcome {
            instance_id: id,
            session_id,
            sprite_id,
            persistent: opts.persistent,
        })
    }

    /// `StopInstance` (spec §4.5.1). Best-effort; Machines errors never
    /// fail the operation.
    pub async fn stop_instance(&self, id: &InstanceId) -> Result<()> {
        let instance = {
            let mut instances = self.instances.lock().expect("instances mutex poisoned");
            instances
                .remove(id)
                .ok_or_else(|| OrchestratorError::InstanceNotFound(id.to_string()))?
        };

        if let Some(sprite_id) = &instance.sprite_id {
            if let Err(err) = self.machines.stop(sprite_id).await {
                warn!(instance_id = %id, error = %err, "best-effort stop of persistent machine failed");
            }
        }

        if let Some(job_id) = &instance.current_job {
            if let Some(machine_id) = self.jobs.snapshot(job_id).and_then(|s| s.machine_id) {
                if Some(&machine_id) != instance.sprite_id.as_ref() {
                    if let Err(err) = self.machines.stop(&machine_id).await {
                        warn!(instance_id = %id, error = %err, "best-effort stop of job machine failed");
                    }
                }
            }
        }

        info!(instance_id = %id, "instance stopped");
        Ok(())
    }

    pub fn get_instance(&self, id: &InstanceId) -> Option<Instance> {
        self.instances.lock().expect("instances mutex poisoned").get(id).cloned()
    }

    pub fn get_instance_by_channel(&self, channel_id: &ChannelId) -> Option<Instance> {
        self.instances
            .lock()
            .expect("instances mutex poisoned")
            .values()
            .find(|i| &i.channel_id == channel_id)
            .cloned()
    }

    pub fn list_instances(&self) -> Vec<Instance> {
        self.instances.lock().expect("instances mutex poisoned").values().cloned().collect()
    }

    pub fn get_job(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs.snapshot(id)
    }

    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.jobs.list_snapshots()
    }

    /// `SendToInstance` (spec §4.5.1): dispatches to the persistent-stream
    /// path or the one-shot-webhook path depending on the instance.
    pub async fn send_to_instance(&self, id: &InstanceId, message: &str, opts: SendOptions) -> SendResult {
        let Some(instance) = self.get_instance(id) else {
            return SendResult::not_found();
        };

        if instance.persistent {
            self.send_persistent(&instance, message, opts).await
        } else {
            self.send_one_shot(&instance, message, opts).await
        }
    }

    // ---- 4.5.3 persistent send --------------------------------------

    async fn send_persistent(&self, instance: &Instance, message: &str, opts: SendOptions) -> SendResult {
        let SendOptions { repo, branch, image, timeout_ms, on_message } = opts;

        let Some(machine_id) = instance.sprite_id.clone() else {
            return SendResult::failure(None, "persistent instance has no backing machine");
        };

        let job_id = JobId::new();
        let job_token = self.token_gen.generate(&job_id);
        let command = build_shell_command(message, instance.session_id.as_str(), AgentKind::ClaudeStyle, &BuildOptions::default());

        let job = Job::new(NewJob {
            id: job_id.clone(),
            job_token,
            task: TaskDef {
                repo,
                branch,
                image,
                command: command.clone(),
            },
            channel_id: instance.channel_id.clone(),
            timeout_ms: timeout_ms.unwrap_or(self.default_timeout_ms),
            on_message,
            on_complete: None,
        });

        self.jobs.insert(job);
        self.jobs.with_job(&job_id, |job| {
            let _ = job.start(machine_id.clone());
        });
        self.set_current_job(&instance.id, Some(job_id.clone()));

        let jobs = self.jobs.clone();
        let relay_job_id = job_id.clone();
        let on_line = move |line: &str| {
            jobs.with_job(&relay_job_id, |job| {
                let appended = job.append_log(line, LogLevel::Info);
                job.notify_message(&appended);
            });
        };

        let stream_result = self
            .machines
            .stream_command(&machine_id, &command, &ExecOptions::default(), &on_line)
            .await;

        let job_result = match stream_result {
            Ok(outcome) => self.jobs.with_job(&job_id, |job| {
                if outcome.success {
                    job.complete(outcome.exit_code);
                } else {
                    job.fail("Sprite reported failure", Some(outcome.exit_code));
                }
                job.result()
            }),
            Err(err) => self.jobs.with_job(&job_id, |job| {
                job.fail(err.to_string(), None);
                job.result()
            }),
        };

        self.clear_current_job_if_matches(&instance.id, &job_id);

        match job_result {
            Some(result) => SendResult::from_job_result(result, true, true),
            None => SendResult::failure(Some(job_id), "job disappeared mid-flight"),
        }
    }

    // ---- 4.5.4 one-shot send: the completion race --------------------

    async fn send_one_shot(&self, instance: &Instance, message: &str, opts: SendOptions) -> SendResult {
        let SendOptions { repo, branch, image, timeout_ms, on_message } = opts;
        let timeout_ms = timeout_ms.unwrap_or(self.default_timeout_ms);

        let job_id = JobId::new();
        let job_token = self.token_gen.generate(&job_id);
        let command = build_shell_command(message, instance.session_id.as_str(), AgentKind::ClaudeStyle, &BuildOptions::default());

        let (tx, mut rx) = tokio::sync::oneshot::channel::<JobResult>();
        let on_complete: OnComplete = Box::new(move |result: JobResult| {
            let _ = tx.send(result);
        });

        let job = Job::new(NewJob {
            id: job_id.clone(),
            job_token: job_token.clone(),
            task: TaskDef {
                repo: repo.clone(),
                branch: branch.clone(),
                image: image.clone(),
                command: command.clone(),
            },
            channel_id: instance.channel_id.clone(),
            timeout_ms,
            on_message,
            on_complete: Some(on_complete),
        });

        self.jobs.insert(job);
        self.set_current_job(&instance.id, Some(job_id.clone()));

        let request = SpawnOneShotRequest {
            job_id: job_id.clone(),
            job_token,
            repo,
            branch,
            image,
            command: command.clone(),
            webhook_base_url: self.webhook_base_url.clone(),
            extra_env: HashMap::new(),
        };

        let machine = match self.machines.spawn_one_shot(&request).await {
            Ok(machine) => machine,
            Err(err) => {
                let job_result = self.jobs.with_job(&job_id, |job| {
                    job.fail(err.to_string(), None);
                    job.result()
                });
                self.clear_current_job_if_matches(&instance.id, &job_id);
                self.schedule_cleanup(job_id.clone());
                return match job_result {
                    Some(result) => SendResult::from_job_result(result, false, true),
                    None => SendResult::failure(Some(job_id), err.to_string()),
                };
            }
        };

        self.jobs.with_job(&job_id, |job| {
            if job.start(machine.id.clone()).is_ok() {
                job.notify_message("Job started");
            }
        });

        let job_result = tokio::select! {
            received = &mut rx => received.ok(),
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                let timed_out = self.jobs.with_job(&job_id, |job| {
                    if job.fail("Job timed out", None) {
                        Some(job.result())
                    } else {
                        None
                    }
                }).flatten();

                match timed_out {
                    Some(result) => {
                        // No webhook ever reported back, so no `schedule_cleanup`
                        // call elsewhere will run for this job — schedule our own.
                        self.schedule_cleanup(job_id.clone());
                        Some(result)
                    }
                    // The webhook path already won the race; wait for its result.
                    None => rx.await.ok(),
                }
            }
        };

        self.clear_current_job_if_matches(&instance.id, &job_id);

        match job_result {
            Some(result) => SendResult::from_job_result(result, false, true),
            None => SendResult::failure(Some(job_id), "Job timed out"),
        }
    }

    // ---- 4.5.5 stale reaper -------------------------------------------

    /// One sweep of `jobs` for timed-out entries (spec §4.5.5). Returns the
    /// number of jobs reaped.
    pub async fn sweep_stale_once(&self) -> usize {
        let mut reaped = 0usize;
        for job_id in self.jobs.timed_out_ids() {
            let outcome = self.jobs.with_job(&job_id, |job| {
                if job.fail("Job timed out (stale reaper)", None) {
                    Some((job.machine_id.clone(), job.take_on_complete(), job.result()))
                } else {
                    None
                }
            });
            let Some(Some((machine_id, callback, result))) = outcome else {
                continue;
            };

            self.clear_current_job_anywhere(&job_id);

            if let Some(cb) = callback {
                if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| cb(result))) {
                    warn!(job_id = %job_id, panic = ?payload, "onComplete callback panicked in stale reaper");
                }
            }

            if let Some(machine_id) = machine_id {
                if let Err(err) = self.machines.destroy(&machine_id).await {
                    warn!(job_id = %job_id, error = %err, "best-effort destroy failed in stale reaper");
                }
            }

            self.jobs.remove(&job_id);
            reaped += 1;
        }
        reaped
    }

    /// Periodic sweep loop (spec §4.5.5), grounded on the teacher's
    /// tick-loop-plus-watch-shutdown shape. Start/stop are idempotent:
    /// dropping the returned task or flipping `shutdown` both just end the
    /// loop cleanly.
    pub async fn run_stale_reaper(self: Arc<Self>, interval_ms: u64, mut shutdown: watch::Receiver<bool>) {
        info!("stale reaper started");
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reaped = self.sweep_stale_once().await;
                    if reaped > 0 {
                        info!(count = reaped, "stale reaper swept jobs");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("stale reaper shutting down");
                        break;
                    }
                }
            }
        }
    }

    // ---- shared helpers -------------------------------------------------

    fn set_current_job(&self, instance_id: &InstanceId, job_id: Option<JobId>) {
        let mut instances = self.instances.lock().expect("instances mutex poisoned");
        if let Some(instance) = instances.get_mut(instance_id) {
            instance.current_job = job_id;
        }
    }

    fn clear_current_job_if_matches(&self, instance_id: &InstanceId, job_id: &JobId) {
        let mut instances = self.instances.lock().expect("instances mutex poisoned");
        if let Some(instance) = instances.get_mut(instance_id) {
            if instance.current_job.as_ref() == Some(job_id) {
                instance.current_job = None;
            }
        }
    }

    fn clear_current_job_anywhere(&self, job_id: &JobId) {
        let mut instances = self.instances.lock().expect("instances mutex poisoned");
        for instance in instances.values_mut() {
            if instance.current_job.as_ref() == Some(job_id) {
                instance.current_job = None;
            }
        }
    }
}
