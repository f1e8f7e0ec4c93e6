use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use dispatch_machines::{FakeMachinesClient, MachinesClient, ReqwestMachinesClient};

mod app;

/// Open Dispatch gateway: webhook ingress + instance manager (spec §4.4,
/// §4.5). Config-file and subcommand parsing are out of scope per spec
/// §1 — this is the thin CLI a deployment actually needs to boot.
#[derive(Parser, Debug)]
#[command(name = "dispatch-gateway", version)]
struct Cli {
    /// Path to a `dispatch.toml` config file.
    #[arg(long)]
    config: Option<String>,

    /// Override `[gateway] port` from the config file.
    #[arg(long)]
    port: Option<u16>,

    /// `tracing_subscriber::EnvFilter` directive, e.g. "debug" or
    /// "dispatch_gateway=debug,tower_http=info".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let mut config = dispatch_core::config::DispatchConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config load failed, using defaults");
        dispatch_core::config::DispatchConfig::default()
    });
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let job_token_secret = config
        .machines
        .job_token_secret
        .clone()
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string())
        .into_bytes();

    let machines: Arc<dyn MachinesClient> = match &config.machines.base_url {
        Some(base_url) => Arc::new(ReqwestMachinesClient::new(
            base_url.clone(),
            config.machines.api_token.clone(),
        )),
        None => {
            info!("no machines.base_url configured, using in-memory fake driver");
            Arc::new(FakeMachinesClient::new())
        }
    };

    let state = Arc::new(app::AppState::new(config, machines, job_token_secret));
    let router = app::build_router(&state);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reaper_instances = state.instances.clone();
    let reaper_interval_ms = state.config.jobs.stale_reaper_interval_ms;
    let reaper_handle = tokio::spawn(reaper_instances.run_stale_reaper(reaper_interval_ms, shutdown_rx));

    let addr: SocketAddr = format!("{}:{}", state.config.gateway.bind, state.config.gateway.port).parse()?;
    info!(%addr, "open dispatch gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = reaper_handle.await;
    Ok(())
}
