//! yadwhd: the yadwh webhook daemon.
//!
//! Assembles the webhook server:
//! - Group credentials from the environment and an optional TOML file
//! - Docker client (local socket or `DOCKER_HOST`)
//! - Update orchestrator
//! - HTTP routes
//!
//! # Usage
//!
//! ```text
//! WH_SECRET_BACKEND_PROD=abcdefghijkl yadwhd --listen 0.0.0.0:8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use yadwh_core::{CredentialStore, DEFAULT_LABEL_KEY};
use yadwh_orchestrator::{DEFAULT_STOP_GRACE, Orchestrator, OrchestratorConfig};
use yadwh_runtime::DockerRuntime;

const DEFAULT_LOG_FILTER: &str =
    "info,yadwhd=debug,yadwh_core=debug,yadwh_runtime=debug,yadwh_orchestrator=debug,yadwh_api=debug";

#[derive(Parser)]
#[command(name = "yadwhd", about = "Webhook that pulls and recreates labeled docker containers")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "YADWH_LISTEN", default_value = "0.0.0.0:80")]
    listen: SocketAddr,

    /// Label key containers use to join groups.
    #[arg(long, env = "YADWH_LABEL_KEY", default_value = DEFAULT_LABEL_KEY)]
    label_key: String,

    /// Seconds a container gets to stop before it is killed.
    #[arg(long, env = "YADWH_STOP_GRACE_SECS", default_value_t = DEFAULT_STOP_GRACE.as_secs())]
    stop_grace_secs: u64,

    /// TOML file with `[groups.<NAME>]` tables. Environment entries win.
    #[arg(long, env = "YADWH_CONFIG")]
    config: Option<PathBuf>,

    /// Docker socket path (`unix:///var/run/docker.sock`).
    /// Falls back to `DOCKER_HOST` and the platform default.
    #[arg(long)]
    docker_host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    run(cli).await
}

fn load_credentials(config: Option<&PathBuf>) -> anyhow::Result<CredentialStore> {
    let from_file = match config {
        Some(path) => CredentialStore::from_toml_file(path)?,
        None => CredentialStore::default(),
    };
    let store = from_file.merge(CredentialStore::from_env()).require_groups()?;
    info!(groups = ?store.names(), "webhook groups loaded");
    Ok(store)
}

async fn connect_docker(docker_host: Option<&str>) -> anyhow::Result<DockerRuntime> {
    let runtime = match docker_host {
        Some(host) if host.starts_with("unix://") || host.starts_with('/') => {
            DockerRuntime::connect_with_socket(host)?
        }
        Some(host) => {
            warn!(%host, "only unix sockets are supported here; using docker defaults");
            DockerRuntime::connect_with_defaults()?
        }
        None => DockerRuntime::connect_with_defaults()?,
    };
    let runtime = runtime.negotiate_version().await?;
    runtime.ping().await.context("docker daemon is not reachable")?;
    info!("docker client connected");
    Ok(runtime)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("yadwh daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let credentials = load_credentials(cli.config.as_ref())?;
    let runtime = connect_docker(cli.docker_host.as_deref()).await?;

    let config = OrchestratorConfig {
        label_key: cli.label_key,
        stop_grace: Duration::from_secs(cli.stop_grace_secs),
    };
    info!(label_key = %config.label_key, stop_grace = ?config.stop_grace, "orchestrator initialized");

    let orchestrator =
        Orchestrator::new(Arc::new(runtime), Arc::new(credentials)).with_config(config);

    // ── Start HTTP server ──────────────────────────────────────

    let router = yadwh_api::build_router(orchestrator);
    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;

    info!(addr = %cli.listen, "webhook server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("yadwh daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
