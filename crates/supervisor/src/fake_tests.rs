// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn spawned_workers_are_alive_and_recorded() {
    let supervisor = FakeSupervisor::new();
    let worker = supervisor.spawn(5601).await.unwrap();

    assert!(worker.is_alive());
    assert_eq!(worker.memory_mib(), Some(42.0));
    assert_eq!(supervisor.spawned().len(), 1);
    assert_eq!(supervisor.last_spawned().unwrap().port(), 5601);
}

#[tokio::test]
async fn external_kill_flips_liveness() {
    let supervisor = FakeSupervisor::new();
    let worker = supervisor.spawn(5601).await.unwrap();
    let handle = supervisor.last_spawned().unwrap();

    handle.kill_externally();
    assert!(!worker.is_alive());
    assert_eq!(worker.memory_mib(), None);
}

#[tokio::test]
async fn terminate_records_grace_and_kills() {
    let supervisor = FakeSupervisor::new();
    let worker = supervisor.spawn(5601).await.unwrap();
    let handle = supervisor.last_spawned().unwrap();

    worker.terminate(Duration::from_secs(3)).await;
    assert!(!worker.is_alive());
    assert_eq!(handle.terminations(), vec![Duration::from_secs(3)]);
}

#[tokio::test]
async fn failing_supervisor_refuses_spawns() {
    let supervisor = FakeSupervisor::new();
    supervisor.fail_spawns(true);
    let err = supervisor.spawn(5601).await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotReady { .. }));
    assert!(supervisor.spawned().is_empty());

    supervisor.fail_spawns(false);
    assert!(supervisor.spawn(5602).await.is_ok());
}
