use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WEBHOOK_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576; // 1 MiB
pub const DEFAULT_JOB_CLEANUP_DELAY_MS: u64 = 30_000; // 30s grace window
pub const DEFAULT_STALE_REAPER_INTERVAL_MS: u64 = 60_000; // 60s sweep
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 600_000; // 10 minutes

/// Top-level config (`dispatch.toml` + `DISPATCH_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub machines: MachinesConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            jobs: JobsConfig::default(),
            machines: MachinesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Per-Job inactivity budget before the completion promise times out
    /// (spec §3 `timeoutMs`, default 600_000 ms).
    #[serde(default = "default_job_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Post-terminal grace window a Job stays authenticatable for late
    /// webhook traffic (spec §3 invariant 6, default 30_000 ms).
    #[serde(default = "default_cleanup_delay_ms")]
    pub cleanup_delay_ms: u64,
    /// Stale-reaper sweep period (spec §4.5.5, default 60_000 ms).
    #[serde(default = "default_reaper_interval_ms")]
    pub stale_reaper_interval_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_job_timeout_ms(),
            cleanup_delay_ms: default_cleanup_delay_ms(),
            stale_reaper_interval_ms: default_reaper_interval_ms(),
        }
    }
}

/// Connection settings for the injected Machines capability (spec §4.3).
/// The wire shape of the real Machines API is an external collaborator —
/// this section only carries what's needed to point the driver at it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MachinesConfig {
    /// Base URL of the Machines API. `None` means "use the in-memory fake"
    /// (the default for local/dev runs without a provider configured).
    pub base_url: Option<String>,
    /// Bearer token used to authenticate against the Machines API itself
    /// (distinct from per-job webhook tokens).
    pub api_token: Option<String>,
    /// HMAC secret for `GenerateJobToken`. If unset, a fresh UUID is
    /// generated at boot (spec §6 — acceptable because in-flight Sprites
    /// are short-lived).
    pub job_token_secret: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_WEBHOOK_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}
fn default_job_timeout_ms() -> u64 {
    DEFAULT_JOB_TIMEOUT_MS
}
fn default_cleanup_delay_ms() -> u64 {
    DEFAULT_JOB_CLEANUP_DELAY_MS
}
fn default_reaper_interval_ms() -> u64 {
    DEFAULT_STALE_REAPER_INTERVAL_MS
}

impl DispatchConfig {
    /// Load config from a TOML file with `DISPATCH_*` env var overrides.
    ///
    /// Checks, in order: explicit path argument, then falls back to
    /// built-in defaults merged with whatever `DISPATCH_*` env vars are
    /// set (so a from-scratch deployment needs no file at all).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(
            DispatchConfig::default(),
        ));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed("DISPATCH_").split("_"))
            .extract()
            .map_err(|e| crate::error::DispatchError::Config(e.to_string()))
    }
}
