// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake supervisor for lifecycle tests.
//!
//! Hands out in-memory worker handles with controllable liveness and
//! memory, and records every termination. No processes are spawned.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Supervisor, SupervisorError, WorkerProcess};

#[derive(Debug)]
struct FakeWorkerState {
    alive: bool,
    memory_mib: f64,
    terminations: Vec<Duration>,
}

/// In-memory stand-in for a worker process.
#[derive(Debug, Clone)]
pub struct FakeWorker {
    pid: u32,
    port: u16,
    state: Arc<Mutex<FakeWorkerState>>,
}

impl FakeWorker {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Simulate the process dying out from under the broker.
    pub fn kill_externally(&self) {
        self.state.lock().alive = false;
    }

    pub fn set_memory_mib(&self, mib: f64) {
        self.state.lock().memory_mib = mib;
    }

    /// Grace periods passed to `terminate`, in call order.
    pub fn terminations(&self) -> Vec<Duration> {
        self.state.lock().terminations.clone()
    }
}

#[async_trait]
impl WorkerProcess for FakeWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    fn memory_mib(&self) -> Option<f64> {
        let state = self.state.lock();
        state.alive.then_some(state.memory_mib)
    }

    async fn terminate(&self, grace: Duration) {
        let mut state = self.state.lock();
        state.terminations.push(grace);
        state.alive = false;
    }
}

/// Supervisor handing out [`FakeWorker`]s.
#[derive(Clone, Default)]
pub struct FakeSupervisor {
    inner: Arc<FakeSupervisorInner>,
}

#[derive(Default)]
struct FakeSupervisorInner {
    next_pid: AtomicU32,
    fail_spawns: AtomicBool,
    spawned: Mutex<Vec<FakeWorker>>,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `spawn` calls fail, as if the worker never
    /// answered its readiness probe.
    pub fn fail_spawns(&self, fail: bool) {
        self.inner.fail_spawns.store(fail, Ordering::SeqCst);
    }

    /// Every worker handed out so far, oldest first.
    pub fn spawned(&self) -> Vec<FakeWorker> {
        self.inner.spawned.lock().clone()
    }

    pub fn last_spawned(&self) -> Option<FakeWorker> {
        self.inner.spawned.lock().last().cloned()
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn spawn(&self, port: u16) -> Result<Box<dyn WorkerProcess>, SupervisorError> {
        if self.inner.fail_spawns.load(Ordering::SeqCst) {
            return Err(SupervisorError::NotReady {
                port,
                waited_secs: 30.0,
            });
        }

        let pid = 10_000 + self.inner.next_pid.fetch_add(1, Ordering::SeqCst);
        let worker = FakeWorker {
            pid,
            port,
            state: Arc::new(Mutex::new(FakeWorkerState {
                alive: true,
                memory_mib: 42.0,
                terminations: Vec::new(),
            })),
        };
        self.inner.spawned.lock().push(worker.clone());
        Ok(Box::new(worker))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
