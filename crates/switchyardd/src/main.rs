//! switchyardd — the Switchyard daemon.
//!
//! Single binary that assembles the migration control plane:
//! - State store (redb) holding route rules and capacity records
//! - Per-route migration orchestrators
//! - Capacity converger standing in for the container scaler
//! - REST API
//!
//! # Usage
//!
//! ```text
//! switchyardd standalone --port 8443 --data-dir /var/lib/switchyard --config switchyard.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use switchyard_core::{RouteSpec, SwitchyardConfig};
use switchyard_migrate::MigrationRegistry;
use switchyardd::converger::Converger;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchyardd", about = "Switchyard migration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane in a single process.
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8443")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/switchyard")]
        data_dir: PathBuf,

        /// Path to switchyard.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Capacity converger tick in seconds. 0 disables it.
        #[arg(long, default_value = "1")]
        converge_interval: u64,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,switchyard=debug,switchyardd=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            config,
            converge_interval,
            log_json,
        } => {
            init_tracing(log_json);
            run_standalone(port, data_dir, config, converge_interval).await
        }
    }
}

/// Route served when no config file is given.
fn default_routes() -> Vec<RouteSpec> {
    vec![RouteSpec {
        id: "route1".to_string(),
        path: "/route1".to_string(),
        priority: 1,
        function_pool: "tg-function-route1".to_string(),
        container_pool: "tg-container-route1".to_string(),
        warm_capacity: None,
    }]
}

async fn run_standalone(
    port: u16,
    data_dir: PathBuf,
    config_path: Option<PathBuf>,
    converge_interval: u64,
) -> anyhow::Result<()> {
    info!("Switchyard daemon starting in standalone mode");

    let mut config = match &config_path {
        Some(path) => SwitchyardConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SwitchyardConfig::default(),
    };
    if config.routes.is_empty() {
        warn!("no routes configured, serving the default route");
        config.routes = default_routes();
    }
    let settings = config.settings()?;
    info!(
        routes = config.routes.len(),
        warm_capacity = settings.warm_capacity,
        poll_interval_ms = settings.poll_interval.as_millis() as u64,
        deadline_secs = settings.deadline.as_secs(),
        "configuration loaded"
    );

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("switchyard.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = switchyard_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let registry = MigrationRegistry::from_store(
        &store,
        &config.routes,
        &settings,
        Some(shutdown_rx.clone()),
    )?;

    // ── Start background tasks ─────────────────────────────────

    let converge_handle = if converge_interval > 0 {
        let converger = Converger::new(store.clone());
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            converger
                .run(Duration::from_secs(converge_interval), shutdown)
                .await;
        }))
    } else {
        info!("capacity converger disabled");
        None
    };

    // ── Start API server ───────────────────────────────────────

    let router = switchyard_api::build_router(switchyard_api::ApiState {
        store,
        registry: Arc::new(registry),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    if let Some(handle) = converge_handle {
        let _ = handle.await;
    }

    info!("Switchyard daemon stopped");
    Ok(())
}
