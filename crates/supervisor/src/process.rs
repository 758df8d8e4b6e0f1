// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-backed supervisor.
//!
//! Workers are plain child processes launched with their port as the
//! single argument. Readiness is probed over the socket rather than
//! by parsing subprocess output: the worker must be bound and
//! answering before any command is routed, and stdout parsing would
//! race with the bind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use orrery_core::CommandRequest;

use crate::{proxy, Supervisor, SupervisorError, WorkerProcess};

/// Per-attempt probe send/receive timeout.
const PROBE_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay between probe attempts.
const PROBE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Total readiness deadline.
const PROBE_DEADLINE: Duration = Duration::from_secs(30);

/// Grace period when tearing down a worker that failed its probe.
const SPAWN_FAILURE_GRACE: Duration = Duration::from_secs(3);

/// Poll interval while waiting out a termination grace period.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for the kernel to reap a killed child.
const KILL_REAP_DEADLINE: Duration = Duration::from_secs(5);

/// Supervisor that launches real worker processes.
pub struct ProcessSupervisor {
    worker_bin: PathBuf,
}

impl ProcessSupervisor {
    /// `worker_bin` is both the spawned executable and the cmdline
    /// needle used by the orphan sweep, so the two stay consistent.
    pub fn new(worker_bin: impl Into<PathBuf>) -> Self {
        Self {
            worker_bin: worker_bin.into(),
        }
    }

    pub fn worker_bin(&self) -> &Path {
        &self.worker_bin
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn spawn(&self, port: u16) -> Result<Box<dyn WorkerProcess>, SupervisorError> {
        let child = Command::new(&self.worker_bin)
            .arg(port.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SupervisorError::SpawnFailed(format!("{}: {}", self.worker_bin.display(), e))
            })?;

        let pid = child.id().ok_or_else(|| {
            SupervisorError::SpawnFailed("worker exited before startup".to_string())
        })?;
        debug!(pid, port, "worker spawned, probing readiness");

        let worker = ProcessWorker {
            pid,
            child: Mutex::new(child),
        };

        if let Err(e) = wait_until_ready(port).await {
            warn!(pid, port, error = %e, "worker never became ready, terminating");
            worker.terminate(SPAWN_FAILURE_GRACE).await;
            return Err(e);
        }

        debug!(pid, port, "worker ready");
        Ok(Box::new(worker))
    }
}

/// Ping the worker socket until it answers or the deadline passes.
async fn wait_until_ready(port: u16) -> Result<(), SupervisorError> {
    let started = tokio::time::Instant::now();
    let ping = CommandRequest::ping();

    loop {
        match proxy::try_send_command(port, &ping, PROBE_ATTEMPT_TIMEOUT).await {
            Ok(reply) if reply.is_success() => return Ok(()),
            Ok(reply) => {
                debug!(port, error = ?reply.error, "readiness probe refused");
            }
            Err(e) => {
                debug!(port, error = %e, "readiness probe attempt failed");
            }
        }

        if started.elapsed() >= PROBE_DEADLINE {
            return Err(SupervisorError::NotReady {
                port,
                waited_secs: started.elapsed().as_secs_f64(),
            });
        }
        tokio::time::sleep(PROBE_RETRY_DELAY).await;
    }
}

/// Handle owning one worker child process.
#[derive(Debug)]
pub struct ProcessWorker {
    pid: u32,
    child: Mutex<Child>,
}

impl ProcessWorker {
    /// `Ok(Some(_))` once exited; reaps the zombie as a side effect.
    fn poll_exited(&self) -> bool {
        match self.child.lock().try_wait() {
            Ok(None) => false,
            Ok(Some(_)) | Err(_) => true,
        }
    }
}

#[async_trait]
impl WorkerProcess for ProcessWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&self) -> bool {
        !self.poll_exited()
    }

    fn memory_mib(&self) -> Option<f64> {
        if self.poll_exited() {
            return None;
        }
        process_memory_mib(self.pid)
    }

    async fn terminate(&self, grace: Duration) {
        if self.poll_exited() {
            return;
        }

        signal_term(self.pid);

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if self.poll_exited() {
                return;
            }
            tokio::time::sleep(REAP_POLL_INTERVAL).await;
        }

        warn!(pid = self.pid, "worker did not terminate gracefully, killing");
        if let Err(e) = self.child.lock().start_kill() {
            // already gone between the poll and the kill
            debug!(pid = self.pid, error = %e, "kill after grace period failed");
        }

        let kill_deadline = tokio::time::Instant::now() + KILL_REAP_DEADLINE;
        while tokio::time::Instant::now() < kill_deadline {
            if self.poll_exited() {
                return;
            }
            tokio::time::sleep(REAP_POLL_INTERVAL).await;
        }
        warn!(pid = self.pid, "worker still not reaped after SIGKILL");
    }
}

/// Resident set size of `pid` in MiB via the OS process table.
pub fn process_memory_mib(pid: u32) -> Option<f64> {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    sys.process(pid)
        .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
}

/// Deliver SIGTERM (or the platform equivalent) to `pid`.
fn signal_term(pid: u32) {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    if let Some(process) = sys.process(pid) {
        if process.kill_with(Signal::Term).is_none() {
            // platform without Term support
            process.kill();
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
