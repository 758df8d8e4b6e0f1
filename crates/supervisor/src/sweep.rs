// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup sweep for orphaned workers.
//!
//! A crashed broker leaves its workers running with ports bound.
//! Before the port pool is populated we scan the process table and
//! terminate anything that looks like one of our workers but is not a
//! child of this broker.

use std::path::Path;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tracing::{info, warn};

/// How long terminated orphans get before the force-kill pass.
const SWEEP_GRACE: Duration = Duration::from_secs(2);

/// Terminate worker processes left behind by a previous broker run.
///
/// A process is an orphan when its command line mentions the worker
/// binary's file name and its parent is not the current process. The
/// needle comes from the same path the supervisor spawns, so sweep and
/// spawn cannot drift apart. Returns the number of processes cleaned.
pub fn sweep_orphans(worker_bin: &Path) -> usize {
    let Some(needle) = worker_bin.file_name().and_then(|n| n.to_str()) else {
        warn!(worker_bin = %worker_bin.display(), "worker binary has no file name, skipping sweep");
        return 0;
    };

    let own_pid = sysinfo::get_current_pid().ok();
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let orphans: Vec<Pid> = sys
        .processes()
        .iter()
        .filter(|(pid, process)| {
            is_orphaned_worker(needle, **pid, process.cmd(), process.parent(), own_pid)
        })
        .map(|(pid, _)| *pid)
        .collect();

    for pid in &orphans {
        if let Some(process) = sys.process(*pid) {
            warn!(pid = pid.as_u32(), "found orphaned worker process, terminating");
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
        }
    }

    if !orphans.is_empty() {
        // grace period, then force-kill whatever survived
        std::thread::sleep(SWEEP_GRACE);
        sys.refresh_processes(ProcessesToUpdate::Some(&orphans), true);
        for pid in &orphans {
            if let Some(process) = sys.process(*pid) {
                warn!(pid = pid.as_u32(), "orphan ignored SIGTERM, killing");
                process.kill();
            }
        }
        info!(count = orphans.len(), "cleaned up orphaned worker processes");
    }

    orphans.len()
}

fn is_orphaned_worker(
    needle: &str,
    pid: Pid,
    cmd: &[std::ffi::OsString],
    parent: Option<Pid>,
    own_pid: Option<Pid>,
) -> bool {
    if Some(pid) == own_pid {
        return false;
    }
    if !cmd.iter().any(|arg| arg.to_string_lossy().contains(needle)) {
        return false;
    }
    // our own children are not orphans
    !(own_pid.is_some() && parent == own_pid)
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
