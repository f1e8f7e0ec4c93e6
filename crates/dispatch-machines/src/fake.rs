use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{MachinesError, Result};
use crate::types::{
    ExecOptions, ExecOutput, MachineInfo, SpawnOneShotRequest, SpawnPersistentRequest,
};
use crate::MachinesClient;

/// Canned response for [`FakeMachinesClient::exec`], keyed by the exact
/// command string a test expects to see.
#[derive(Debug, Clone)]
pub struct ScriptedExec {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl Default for ScriptedExec {
    fn default() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

/// In-memory stand-in for a real Sprite backend (spec §1 names the
/// Machines wire protocol out of scope, so this is what the rest of the
/// workspace is actually tested against). Never spawns a process or
/// makes a network call; every outcome is either scripted ahead of time
/// or recorded for a test to assert on afterward.
#[derive(Default)]
pub struct FakeMachinesClient {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    machines: HashMap<String, bool>,
    stopped: Vec<String>,
    destroyed: Vec<String>,
    woken: Vec<String>,
    exec_calls: Vec<(String, String)>,
    scripted_exec: HashMap<String, ScriptedExec>,
    spawn_failures: u32,
    fail_exec: bool,
}

impl FakeMachinesClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `spawn_one_shot`/`spawn_persistent` call (and only
    /// the next one) fail with `SpawnFailed`.
    pub fn fail_next_spawn(&self) {
        self.state.lock().expect("fake state poisoned").spawn_failures += 1;
    }

    pub fn fail_exec_calls(&self) {
        self.state.lock().expect("fake state poisoned").fail_exec = true;
    }

    pub fn script_exec(&self, command: impl Into<String>, response: ScriptedExec) {
        self.state
            .lock()
            .expect("fake state poisoned")
            .scripted_exec
            .insert(command.into(), response);
    }

    pub fn stopped_ids(&self) -> Vec<String> {
        self.state.lock().expect("fake state poisoned").stopped.clone()
    }

    pub fn destroyed_ids(&self) -> Vec<String> {
        self.state.lock().expect("fake state poisoned").destroyed.clone()
    }

    pub fn woken_ids(&self) -> Vec<String> {
        self.state.lock().expect("fake state poisoned").woken.clone()
    }

    pub fn exec_calls(&self) -> Vec<(String, String)> {
        self.state.lock().expect("fake state poisoned").exec_calls.clone()
    }

    fn next_machine(&self, persistent: bool) -> MachineInfo {
        let mut state = self.state.lock().expect("fake state poisoned");
        state.next_id += 1;
        let id = format!("fake-machine-{}-{}", state.next_id, Uuid::now_v7());
        state.machines.insert(id.clone(), persistent);
        MachineInfo { id, persistent }
    }
}

#[async_trait]
impl MachinesClient for FakeMachinesClient {
    async fn spawn_one_shot(&self, _request: &SpawnOneShotRequest) -> Result<MachineInfo> {
        {
            let mut state = self.state.lock().expect("fake state poisoned");
            if state.spawn_failures > 0 {
                state.spawn_failures -= 1;
                return Err(MachinesError::SpawnFailed("scripted failure".into()));
            }
        }
        Ok(self.next_machine(false))
    }

    async fn spawn_persistent(&self, _request: &SpawnPersistentRequest) -> Result<MachineInfo> {
        {
            let mut state = self.state.lock().expect("fake state poisoned");
            if state.spawn_failures > 0 {
                state.spawn_failures -= 1;
                return Err(MachinesError::SpawnFailed("scripted failure".into()));
            }
        }
        Ok(self.next_machine(true))
    }

    async fn stop(&self, machine_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("fake state poisoned");
        state.stopped.push(machine_id.to_string());
        Ok(())
    }

    async fn destroy(&self, machine_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("fake state poisoned");
        state.destroyed.push(machine_id.to_string());
        state.machines.remove(machine_id);
        Ok(())
    }

    async fn wake(&self, machine_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("fake state poisoned");
        state.woken.push(machine_id.to_string());
        Ok(())
    }

    async fn exec(
        &self,
        machine_id: &str,
        command: &str,
        _options: &ExecOptions,
    ) -> Result<ExecOutput> {
        let mut state = self.state.lock().expect("fake state poisoned");
        if state.fail_exec {
            return Err(MachinesError::Transport("scripted exec failure".into()));
        }
        state
            .exec_calls
            .push((machine_id.to_string(), command.to_string()));
        let scripted = state.scripted_exec.get(command).cloned().unwrap_or_default();
        Ok(ExecOutput {
            stdout: scripted.stdout,
            stderr: scripted.stderr,
            exit_code: scripted.exit_code,
        })
    }
}
