//! hostpoold: the hostpool daemon.
//!
//! Single binary that assembles the hostpool subsystems:
//! - State store (redb)
//! - Assignment engine
//! - REST API + Prometheus endpoint
//!
//! # Usage
//!
//! ```text
//! hostpoold init-config --data-dir /var/lib/hostpool > hostpool.toml
//! hostpoold serve --config hostpool.toml --port 8443
//! ```

mod seed;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use hostpool_assign::AssignmentEngine;
use hostpool_core::HostpoolConfig;
use hostpool_state::StateStore;

#[derive(Parser)]
#[command(name = "hostpoold", about = "hostpool assignment daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the store, apply config seeds and serve the API.
    Serve {
        /// Path to hostpool.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print a scaffolded hostpool.toml to stdout.
    InitConfig {
        /// Data directory written into the scaffold.
        #[arg(long, default_value = "/var/lib/hostpool")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hostpoold=debug,hostpool_assign=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.daemon.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.daemon.data_dir = data_dir;
            }
            run_serve(config).await
        }
        Command::InitConfig { data_dir } => {
            print!("{}", HostpoolConfig::scaffold(&data_dir).to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HostpoolConfig> {
    match path {
        Some(path) => HostpoolConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(HostpoolConfig::default()),
    }
}

async fn run_serve(config: HostpoolConfig) -> anyhow::Result<()> {
    info!("hostpool daemon starting");

    // Ensure data directory exists.
    let data_dir = &config.daemon.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("hostpool.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let engine = AssignmentEngine::new(store, config.engine.clone());
    info!(
        retries = config.engine.max_commit_retries,
        timeout_ms = config.engine.request_timeout_ms,
        "assignment engine initialized"
    );

    seed::apply(&engine, &config)?;

    // ── Start API server ───────────────────────────────────────

    let router = hostpool_api::build_router(engine);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.daemon.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("hostpool daemon stopped");
    Ok(())
}
