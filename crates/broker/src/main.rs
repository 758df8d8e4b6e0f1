// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orrery broker daemon (orreryd).
//!
//! Owns the port pool, the session registry, the idle reaper, and the
//! HTTP surface. One worker process is spawned per session; orphans
//! from a crashed broker are swept before the pool is populated.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use orrery_broker::reaper::{spawn_reaper, REAP_INTERVAL};
use orrery_broker::{router, ApiState, RegistrySettings, SessionRegistry};
use orrery_core::{Config, SystemClock};
use orrery_store::{CommandFilter, SessionStore};
use orrery_supervisor::{sweep_orphans, ProcessSupervisor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Handle info flags before touching config or the database
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("orreryd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("orreryd {}", env!("CARGO_PKG_VERSION"));
                println!("Orrery broker - session lifecycle and routing for engine workers");
                println!();
                println!("USAGE:");
                println!("    orreryd");
                println!();
                println!("Configuration is read from the file named by ORRERY_CONFIG");
                println!("(default: ./orrery.toml). Missing file means defaults.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: orreryd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    setup_logging(&config)?;

    info!("starting orrery broker");

    // Reclaim workers left behind by a crashed broker before any port
    // is handed out.
    let worker_bin = resolve_worker_bin(&config)?;
    let swept = sweep_orphans(&worker_bin);
    if swept > 0 {
        info!(count = swept, "cleaned up orphaned worker processes");
    }

    let filter = CommandFilter::from_lists(
        &config.database.log_include_commands,
        &config.database.log_exclude_commands,
    );
    let store = Arc::new(SessionStore::open(&config.database.path, filter)?);

    let supervisor = ProcessSupervisor::new(&worker_bin);
    info!(worker_bin = %worker_bin.display(), "worker supervisor ready");

    let registry = Arc::new(SessionRegistry::new(
        supervisor,
        Arc::clone(&store),
        Arc::new(SystemClock),
        RegistrySettings {
            port_start: config.port_pool.start,
            port_end: config.port_pool.end,
            idle_timeout_seconds: config.session.idle_timeout_seconds,
        },
    ));
    info!(
        start = config.port_pool.start,
        end = config.port_pool.end,
        ports = config.port_pool.end - config.port_pool.start,
        "port pool configured"
    );

    let reaper = spawn_reaper(Arc::clone(&registry), REAP_INTERVAL);

    let state = ApiState {
        registry: Arc::clone(&registry),
        store,
        api_key: config.auth.api_key_opt(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "broker listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Shutdown order matters: stop the reaper first so it cannot race
    // the final sweep, then end every live session.
    reaper.abort();
    let count = registry.shutdown_all().await;
    if count > 0 {
        info!(count, "shut down active sessions");
    }
    info!("broker stopped");
    Ok(())
}

/// Resolve the worker executable: configured path, or the
/// `orrery-worker` binary sitting next to this one.
fn resolve_worker_bin(config: &Config) -> Result<PathBuf, std::io::Error> {
    if !config.worker.binary.is_empty() {
        return Ok(PathBuf::from(&config.worker.binary));
    }
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "broker executable has no parent directory",
        )
    })?;
    Ok(dir.join("orrery-worker"))
}

/// Resolve SIGINT or SIGTERM into a graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

fn setup_logging(config: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format.as_str() {
        "compact" => builder.compact().try_init()?,
        "pretty" => builder.pretty().try_init()?,
        _ => builder.try_init()?,
    }
    Ok(())
}
