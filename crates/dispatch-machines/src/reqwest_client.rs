use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MachinesError, Result};
use crate::types::{ExecOptions, ExecOutput, MachineInfo, SpawnOneShotRequest, SpawnPersistentRequest};
use crate::MachinesClient;

/// HTTP-backed [`MachinesClient`] driver. The Machines API's own wire
/// contract is out of scope for this crate (spec §1 names it an
/// external collaborator) — this is a thin, best-guess REST client
/// against a conventional `{base_url}/machines/...` shape, kept mostly
/// so the workspace has a non-fake implementation to wire up behind the
/// trait object. Tests exercise [`crate::fake::FakeMachinesClient`]
/// instead.
pub struct ReqwestMachinesClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl ReqwestMachinesClient {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send_expect_ok(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|err| MachinesError::Transport(err.to_string()))?;
        if response.status().as_u16() == 404 {
            return Err(MachinesError::NotFound(response.url().to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MachinesError::Protocol(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

#[derive(Serialize)]
struct SpawnOneShotBody<'a> {
    job_id: &'a str,
    job_token: &'a str,
    repo: &'a Option<String>,
    branch: &'a Option<String>,
    image: &'a Option<String>,
    command: &'a str,
    webhook_url: &'a str,
    env: std::collections::HashMap<String, String>,
}

#[derive(Serialize)]
struct SpawnPersistentBody<'a> {
    repo: &'a Option<String>,
    branch: &'a Option<String>,
    image: &'a Option<String>,
    env: &'a std::collections::HashMap<String, String>,
}

#[derive(Serialize)]
struct ExecBody<'a> {
    command: &'a str,
    workdir: &'a Option<String>,
    env: &'a std::collections::HashMap<String, String>,
}

#[derive(Deserialize)]
struct MachineInfoBody {
    id: String,
    #[serde(default)]
    persistent: bool,
}

#[derive(Deserialize)]
struct ExecOutputBody {
    stdout: String,
    #[serde(default)]
    stderr: String,
    exit_code: i32,
}

#[async_trait]
impl MachinesClient for ReqwestMachinesClient {
    async fn spawn_one_shot(&self, request: &SpawnOneShotRequest) -> Result<MachineInfo> {
        let body = SpawnOneShotBody {
            job_id: request.job_id.as_str(),
            job_token: &request.job_token,
            repo: &request.repo,
            branch: &request.branch,
            image: &request.image,
            command: &request.command,
            webhook_url: &request.webhook_base_url,
            env: request.env(),
        };
        let response = self
            .send_expect_ok(self.request(reqwest::Method::POST, "/machines/one-shot").json(&body))
            .await?;
        let parsed: MachineInfoBody = response
            .json()
            .await
            .map_err(|err| MachinesError::Protocol(err.to_string()))?;
        Ok(MachineInfo {
            id: parsed.id,
            persistent: parsed.persistent,
        })
    }

    async fn spawn_persistent(&self, request: &SpawnPersistentRequest) -> Result<MachineInfo> {
        let body = SpawnPersistentBody {
            repo: &request.repo,
            branch: &request.branch,
            image: &request.image,
            env: &request.env,
        };
        let response = self
            .send_expect_ok(self.request(reqwest::Method::POST, "/machines/persistent").json(&body))
            .await?;
        let parsed: MachineInfoBody = response
            .json()
            .await
            .map_err(|err| MachinesError::Protocol(err.to_string()))?;
        Ok(MachineInfo {
            id: parsed.id,
            persistent: parsed.persistent,
        })
    }

    async fn stop(&self, machine_id: &str) -> Result<()> {
        let path = format!("/machines/{machine_id}/stop");
        match self.send_expect_ok(self.request(reqwest::Method::POST, &path)).await {
            Ok(_) => Ok(()),
            Err(MachinesError::NotFound(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    async fn destroy(&self, machine_id: &str) -> Result<()> {
        let path = format!("/machines/{machine_id}");
        match self.send_expect_ok(self.request(reqwest::Method::DELETE, &path)).await {
            Ok(_) => Ok(()),
            Err(MachinesError::NotFound(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    async fn wake(&self, machine_id: &str) -> Result<()> {
        let path = format!("/machines/{machine_id}/wake");
        self.send_expect_ok(self.request(reqwest::Method::POST, &path)).await?;
        Ok(())
    }

    async fn exec(
        &self,
        machine_id: &str,
        command: &str,
        options: &ExecOptions,
    ) -> Result<ExecOutput> {
        let path = format!("/machines/{machine_id}/exec");
        let body = ExecBody {
            command,
            workdir: &options.workdir,
            env: &options.env,
        };
        let response = self
            .send_expect_ok(self.request(reqwest::Method::POST, &path).json(&body))
            .await?;
        let parsed: ExecOutputBody = response
            .json()
            .await
            .map_err(|err| MachinesError::Protocol(err.to_string()))?;
        Ok(ExecOutput {
            stdout: parsed.stdout,
            stderr: parsed.stderr,
            exit_code: parsed.exit_code,
        })
    }
}
