// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orrery-supervisor: worker process ownership.
//!
//! One handle per worker process. The handle owns the OS process:
//! once `terminate` returns, the process is no longer running. The
//! RPC proxy in this crate is the only way the broker talks to a
//! worker socket.

mod process;
pub mod proxy;
mod sweep;

pub use process::{ProcessSupervisor, ProcessWorker};
pub use sweep::sweep_orphans;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSupervisor, FakeWorker};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from worker lifecycle operations
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("worker on port {port} not ready after {waited_secs:.0}s")]
    NotReady { port: u16, waited_secs: f64 },
}

/// Handle to one supervised worker process.
#[async_trait]
pub trait WorkerProcess: Send + Sync + std::fmt::Debug {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Non-blocking liveness check against the OS.
    fn is_alive(&self) -> bool;

    /// Resident set size in MiB, or `None` once the process has died.
    fn memory_mib(&self) -> Option<f64>;

    /// Request graceful termination, wait up to `grace`, then
    /// force-kill. Safe to call on an already-dead process.
    async fn terminate(&self, grace: Duration);
}

/// Spawns workers bound to broker-assigned ports.
#[async_trait]
pub trait Supervisor: Send + Sync + 'static {
    /// Launch a worker on `port` and wait for it to answer `ping`.
    ///
    /// On probe failure the child is terminated before the error is
    /// returned; a failed spawn leaves no process behind.
    async fn spawn(&self, port: u16) -> Result<Box<dyn WorkerProcess>, SupervisorError>;
}
