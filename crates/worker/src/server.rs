// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker reply loop.
//!
//! Binds the assigned port on loopback and answers one request at a
//! time: connections are accepted sequentially and requests within a
//! connection are served in order until the peer closes. The engine
//! is single-threaded, so there is nothing to gain from concurrency
//! here and plenty to lose.

use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use orrery_core::{wire, WireError, WorkerReply};

use crate::dispatch::Dispatcher;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[from] std::io::Error),
}

/// Timeout for writing a reply back to the broker.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// The worker's serving half: a bound listener plus the dispatcher.
pub struct WorkerServer {
    listener: TcpListener,
    port: u16,
    dispatcher: Dispatcher,
}

impl WorkerServer {
    /// Bind `127.0.0.1:port`. Pass port 0 to let the OS pick (tests).
    pub async fn bind(port: u16) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port, source })?
            .port();
        Ok(Self {
            listener,
            port,
            dispatcher: Dispatcher::new(),
        })
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until the process is killed.
    pub async fn run(mut self) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "client connected");
            self.serve_connection(stream).await;
        }
    }

    /// Answer requests on one connection until EOF.
    async fn serve_connection(&mut self, mut stream: TcpStream) {
        loop {
            let bytes = match wire::read_message(&mut stream).await {
                Ok(bytes) => bytes,
                Err(WireError::ConnectionClosed) => {
                    debug!("client disconnected");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "dropping connection on read error");
                    return;
                }
            };

            // a decodable frame with a bad payload gets an in-band error
            let reply = match wire::decode(&bytes) {
                Ok(request) => self.dispatcher.handle(&request),
                Err(e) => WorkerReply::err(format!("invalid request: {e}")),
            };

            if let Err(e) = wire::write_reply(&mut stream, &reply, WRITE_TIMEOUT).await {
                warn!(error = %e, "failed to write reply, dropping connection");
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
