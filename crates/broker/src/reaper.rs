// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic idle-session eviction.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use orrery_supervisor::Supervisor;

use crate::registry::SessionRegistry;

/// Default scan interval.
pub const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the reaper task. The caller aborts it at shutdown, before
/// `shutdown_all` runs, so eviction and shutdown never race.
pub fn spawn_reaper<S: Supervisor>(
    registry: Arc<SessionRegistry<S>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately; skip it so a fresh broker
        // does not scan an empty registry
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = registry.reap_idle().await;
            if evicted > 0 {
                info!(count = evicted, "cleaned up idle sessions");
            }
        }
    })
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
