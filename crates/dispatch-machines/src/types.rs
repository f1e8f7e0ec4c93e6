use std::collections::HashMap;

use dispatch_core::JobId;

/// Everything `SpawnOneShot` needs to boot a Sprite for one Job (spec
/// §4.3). The env block it carries into the Machine mirrors the
/// `JOB_ID`/`JOB_TOKEN`/`OPEN_DISPATCH_URL`/`REPO`/`BRANCH`/`COMMAND`
/// variables the reporter reads on the other side (spec §6).
#[derive(Debug, Clone)]
pub struct SpawnOneShotRequest {
    pub job_id: JobId,
    pub job_token: String,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub image: Option<String>,
    pub command: String,
    /// Base URL of this process's webhook ingress, handed to the reporter
    /// as `OPEN_DISPATCH_URL`.
    pub webhook_base_url: String,
    /// Additional env entries (agent credentials, etc).
    pub extra_env: HashMap<String, String>,
}

impl SpawnOneShotRequest {
    /// The env block a driver should inject into the spawned Machine.
    pub fn env(&self) -> HashMap<String, String> {
        let mut env = self.extra_env.clone();
        env.insert("JOB_ID".to_string(), self.job_id.to_string());
        env.insert("JOB_TOKEN".to_string(), self.job_token.clone());
        env.insert("OPEN_DISPATCH_URL".to_string(), self.webhook_base_url.clone());
        if let Some(repo) = &self.repo {
            env.insert("REPO".to_string(), repo.clone());
        }
        if let Some(branch) = &self.branch {
            env.insert("BRANCH".to_string(), branch.clone());
        }
        env.insert("COMMAND".to_string(), self.command.clone());
        env
    }
}

/// A persistent instance's backing Machine (spec §4.3 `SpawnPersistent`).
#[derive(Debug, Clone)]
pub struct SpawnPersistentRequest {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub image: Option<String>,
    pub env: HashMap<String, String>,
}

/// Handle returned by either spawn call.
#[derive(Debug, Clone)]
pub struct MachineInfo {
    pub id: String,
    pub persistent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub workdir: Option<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub success: bool,
    pub exit_code: i32,
}
