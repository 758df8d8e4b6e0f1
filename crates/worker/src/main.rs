// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker entrypoint.
//!
//! Launched by the broker as `orrery-worker <port>`. Binds the reply
//! socket before serving so that the broker's readiness probe only
//! succeeds once commands can actually be answered.

use tracing::info;
use tracing_subscriber::EnvFilter;

use orrery_worker::WorkerServer;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port = match parse_port() {
        Some(port) => port,
        None => {
            eprintln!("usage: orrery-worker <port>");
            std::process::exit(2);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let server = WorkerServer::bind(port).await?;
    info!(port = server.port(), "worker running");
    server.run().await?;
    Ok(())
}

fn parse_port() -> Option<u16> {
    let mut args = std::env::args().skip(1);
    let raw = args.next()?;
    if args.next().is_some() {
        return None;
    }
    raw.parse().ok()
}
