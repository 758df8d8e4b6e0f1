// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn spawn_child(cmd: &str, args: &[&str]) -> ProcessWorker {
    let child = Command::new(cmd)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let pid = child.id().unwrap();
    ProcessWorker {
        pid,
        child: Mutex::new(child),
    }
}

#[tokio::test]
async fn running_child_reports_alive_and_memory() {
    let worker = spawn_child("sleep", &["30"]);
    assert!(worker.is_alive());
    assert!(worker.memory_mib().is_some());

    worker.terminate(Duration::from_secs(3)).await;
    assert!(!worker.is_alive());
}

#[tokio::test]
async fn exited_child_reports_dead_and_no_memory() {
    let worker = spawn_child("true", &[]);
    // give it a moment to exit
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!worker.is_alive());
    assert_eq!(worker.memory_mib(), None);
}

#[tokio::test]
async fn terminate_is_idempotent() {
    let worker = spawn_child("sleep", &["30"]);
    worker.terminate(Duration::from_secs(3)).await;
    // second call must be a no-op, not an error or a hang
    worker.terminate(Duration::from_secs(1)).await;
    assert!(!worker.is_alive());
}

#[tokio::test]
async fn spawn_of_missing_binary_fails_cleanly() {
    let supervisor = ProcessSupervisor::new("/nonexistent/orrery-worker");
    let err = supervisor.spawn(59999).await.unwrap_err();
    assert!(matches!(err, SupervisorError::SpawnFailed(_)));
}
