pub mod error;
pub mod reqwest_client;
pub mod token;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use error::{MachinesError, Result};
pub use reqwest_client::ReqwestMachinesClient;
pub use token::JobTokenGenerator;
pub use types::{
    ExecOptions, ExecOutput, MachineInfo, SpawnOneShotRequest, SpawnPersistentRequest,
    StreamOutcome,
};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMachinesClient, ScriptedExec};

use async_trait::async_trait;

/// The one capability the orchestrator injects to reach Sprites (spec
/// §4.3). Mirrors the shape the teacher's `LlmProvider` trait gives
/// `skynet-agent` — a small async surface the rest of the crate never
/// needs to know a concrete implementation of.
#[async_trait]
pub trait MachinesClient: Send + Sync {
    /// Boot a Machine that runs `request.command` once and exits,
    /// reporting back to `request.webhook_base_url`. Must not mutate any
    /// Job state itself — the orchestrator calls `Job::start`/`Job::fail`
    /// around this call, since a `MutexGuard<Job>` can't be held across
    /// the await this method performs.
    async fn spawn_one_shot(&self, request: &SpawnOneShotRequest) -> Result<MachineInfo>;

    /// Boot a long-lived Machine backing a persistent instance.
    async fn spawn_persistent(&self, request: &SpawnPersistentRequest) -> Result<MachineInfo>;

    /// Stop a Machine without destroying it. Idempotent: a 404 from the
    /// backend is treated as success (spec §4.3/§9 — "stopping what's
    /// already gone is not an error").
    async fn stop(&self, machine_id: &str) -> Result<()>;

    /// Destroy a Machine outright. Idempotent in the same sense as `stop`.
    async fn destroy(&self, machine_id: &str) -> Result<()>;

    /// Wake a stopped persistent Machine before sending it a command.
    async fn wake(&self, machine_id: &str) -> Result<()>;

    /// Run a single command against an already-running Machine and
    /// collect its full output. Used by `stream_command`'s default body
    /// and directly by anything that only needs a one-shot exec.
    async fn exec(&self, machine_id: &str, command: &str, options: &ExecOptions)
        -> Result<ExecOutput>;

    /// Wake the Machine, run `command`, and report completion. The
    /// default implementation is the only one most drivers need: it's
    /// built entirely from `wake` + `exec`, splitting stdout/stderr into
    /// non-empty lines and prefixing stderr lines with `[stderr] ` before
    /// handing them to `on_line` (spec §4.3's persistent-send path —
    /// "emit non-empty lines to the callback").
    async fn stream_command(
        &self,
        machine_id: &str,
        command: &str,
        options: &ExecOptions,
        on_line: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<StreamOutcome> {
        self.wake(machine_id).await?;
        let output = self.exec(machine_id, command, options).await?;

        for line in output.stdout.lines().filter(|l| !l.is_empty()) {
            on_line(line);
        }
        for line in output.stderr.lines().filter(|l| !l.is_empty()) {
            on_line(&format!("[stderr] {line}"));
        }

        Ok(StreamOutcome {
            success: output.exit_code == 0,
            exit_code: output.exit_code,
        })
    }
}
