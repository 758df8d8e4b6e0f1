// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/reply client for worker sockets.
//!
//! One short-lived connection per call. The worker answers a single
//! outstanding request; concurrent callers for the same session are
//! serialized by the registry's per-session gate, not here.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::warn;

use orrery_core::{wire, CommandRequest, WireError, WorkerReply};

/// Default timeout for a routed command. Engine commands can be slow;
/// the probe path passes its own much shorter timeout.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// Send one command and await the reply, folding wire failures into
/// the error envelope. A transport failure is an in-band result: it
/// does not mark the session dead, the supervisor's liveness check
/// does that.
pub async fn send_command(port: u16, request: &CommandRequest, timeout: Duration) -> WorkerReply {
    match try_send_command(port, request, timeout).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(port, command = %request.command, error = %e, "worker rpc failed");
            WorkerReply::transport_error(e)
        }
    }
}

/// Send one command, propagating wire failures. Used by the readiness
/// probe, which needs to distinguish "not yet listening" from a real
/// reply.
pub async fn try_send_command(
    port: u16,
    request: &CommandRequest,
    timeout: Duration,
) -> Result<WorkerReply, WireError> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| WireError::Timeout)??;

    wire::write_request(&mut stream, request, timeout).await?;
    wire::read_reply(&mut stream, timeout).await
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
