//! netatlas-daemon - certified network topology aggregation daemon.
//!
//! Periodically correlates two external datasets (the topology registry
//! and the hardware inventory) into per-subnet generation aggregates,
//! certifies the aggregate statistics, and serves them over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use netatlas_core::certify::EchoCertifier;
use netatlas_core::config::ServiceConfig;
use netatlas_daemon::backend::ReqwestBackend;
use netatlas_daemon::handlers;
use netatlas_daemon::state::ServiceHandle;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// netatlas daemon - certified network topology aggregator
#[derive(Parser, Debug)]
#[command(name = "netatlas-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to service configuration file
    #[arg(short, long, default_value = "netatlas.toml")]
    config: PathBuf,

    /// Override the configured listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the configured state file path
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Log filter (tracing `EnvFilter` syntax)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = if args.config.exists() {
        ServiceConfig::from_file(&args.config)
            .with_context(|| format!("failed to load {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "no configuration file, using defaults");
        ServiceConfig::default()
    };
    if let Some(listen) = args.listen {
        config.daemon.listen_addr = listen.to_string();
    }
    if let Some(state_file) = args.state_file {
        config.daemon.state_file = state_file;
    }

    let backend = Arc::new(ReqwestBackend::new().context("failed to build HTTP backend")?);
    let provider = Arc::new(EchoCertifier::default());
    let state = ServiceHandle::initialize(&config, backend, provider)
        .context("failed to initialize service state")?;

    let listen_addr: SocketAddr = config
        .daemon
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.daemon.listen_addr))?;
    let app = handlers::router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!(%listen_addr, "daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("server error")?;

    info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal(state: netatlas_daemon::state::SharedState) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    state.request_shutdown();
    info!("shutdown requested");
}
