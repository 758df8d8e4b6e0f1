// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orrery_core::FakeClock;
use orrery_store::CommandFilter;
use orrery_supervisor::FakeSupervisor;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    clock: FakeClock,
    supervisor: FakeSupervisor,
    store: Arc<SessionStore>,
    registry: SessionRegistry<FakeSupervisor>,
}

fn fixture_with(settings: RegistrySettings) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SessionStore::open(&dir.path().join("orrery.db"), CommandFilter::all()).unwrap(),
    );
    let clock = FakeClock::at(1_000.0);
    let supervisor = FakeSupervisor::new();
    let registry = SessionRegistry::new(
        supervisor.clone(),
        Arc::clone(&store),
        Arc::new(clock.clone()),
        settings,
    );
    Fixture {
        _dir: dir,
        clock,
        supervisor,
        store,
        registry,
    }
}

fn fixture() -> Fixture {
    fixture_with(RegistrySettings {
        port_start: 5600,
        port_end: 5610,
        idle_timeout_seconds: 60.0,
    })
}

#[tokio::test]
async fn create_reserves_a_port_and_registers_the_session() {
    let fx = fixture();
    let snapshot = fx.registry.create(Some("1.2.3.4".into()), None).await.unwrap();

    assert_eq!(snapshot.port, 5600);
    assert_eq!(snapshot.created_at, 1_000.0);
    assert_eq!(snapshot.last_activity, 1_000.0);
    assert_eq!(snapshot.mem_used, 0.0);
    assert_eq!(snapshot.user_display_name, "Not logged in");

    // the session's port is reserved and nowhere else
    let status = fx.registry.port_status();
    assert_eq!(status.reserved_port_list, vec![5600]);
    assert_eq!(status.available_ports, 9);

    // durable created row
    let row = fx.store.session_row(&snapshot.session_id).unwrap().unwrap();
    assert_eq!(row.status, "active");
    assert_eq!(row.port, 5600);
    assert_eq!(row.client_ip.as_deref(), Some("1.2.3.4"));

    assert!(fx.registry.get(&snapshot.session_id).is_some());
}

#[tokio::test]
async fn end_releases_port_terminates_worker_and_records_reason() {
    let fx = fixture();
    let snapshot = fx.registry.create(None, None).await.unwrap();
    let worker = fx.supervisor.last_spawned().unwrap();

    assert!(fx.registry.end(&snapshot.session_id, TerminationReason::Manual).await);

    assert!(fx.registry.get(&snapshot.session_id).is_none());
    assert!(!worker.is_alive());
    assert_eq!(worker.terminations().len(), 1);
    assert_eq!(fx.registry.port_status().reserved_ports, 0);

    let row = fx.store.session_row(&snapshot.session_id).unwrap().unwrap();
    assert_eq!(row.status, "terminated");
    assert_eq!(row.termination_reason.as_deref(), Some("manual"));
    assert!(row.destroyed_at.unwrap() >= row.created_at);
}

#[tokio::test]
async fn end_of_unknown_session_is_a_noop() {
    let fx = fixture();
    let ghost = SessionId::new("ghost");

    assert!(!fx.registry.end(&ghost, TerminationReason::Manual).await);
    assert!(fx.store.session_row(&ghost).unwrap().is_none());
    assert_eq!(fx.registry.port_status().reserved_ports, 0);
}

#[tokio::test]
async fn spawn_failure_rolls_back_completely() {
    let fx = fixture();
    fx.supervisor.fail_spawns(true);

    let err = fx.registry.create(None, None).await.unwrap_err();
    assert!(matches!(err, RegistryError::SpawnFailed { port: 5600, .. }));

    // port released, no registry entry, no created row
    let status = fx.registry.port_status();
    assert_eq!(status.reserved_ports, 0);
    assert_eq!(status.available_ports, 10);
    assert!(fx.registry.list().await.is_empty());
    assert_eq!(fx.store.active_session_count().unwrap(), 0);

    // the pool recovers once spawns work again
    fx.supervisor.fail_spawns(false);
    assert!(fx.registry.create(None, None).await.is_ok());
}

#[tokio::test]
async fn pool_exhaustion_fails_the_third_create() {
    let fx = fixture_with(RegistrySettings {
        port_start: 5600,
        port_end: 5602,
        idle_timeout_seconds: 60.0,
    });

    fx.registry.create(None, None).await.unwrap();
    fx.registry.create(None, None).await.unwrap();
    let err = fx.registry.create(None, None).await.unwrap_err();
    assert!(matches!(err, RegistryError::NoCapacity));

    let status = fx.registry.port_status();
    assert_eq!(status.available_ports, 0);
    assert_eq!(status.reserved_ports, 2);
    assert_eq!(fx.registry.list().await.len(), 2);
}

#[tokio::test]
async fn list_evicts_sessions_with_dead_workers() {
    let fx = fixture();
    let keep = fx.registry.create(None, None).await.unwrap();
    let doomed = fx.registry.create(None, None).await.unwrap();
    let doomed_worker = fx.supervisor.last_spawned().unwrap();

    doomed_worker.kill_externally();

    let sessions = fx.registry.list().await;
    assert_eq!(sessions.len(), 1);
    assert!(sessions.contains_key(&keep.session_id));

    let row = fx.store.session_row(&doomed.session_id).unwrap().unwrap();
    assert_eq!(row.termination_reason.as_deref(), Some("dead_process"));
    // the dead session's port is back in the pool
    assert_eq!(fx.registry.port_status().reserved_ports, 1);
}

#[tokio::test]
async fn reap_idle_honors_the_timeout() {
    let fx = fixture();
    let idle = fx.registry.create(None, None).await.unwrap();
    fx.clock.advance(30.0);
    let fresh = fx.registry.create(None, None).await.unwrap();
    fx.clock.advance(45.0);

    // idle is now 75s stale, fresh only 45s
    let evicted = fx.registry.reap_idle().await;
    assert_eq!(evicted, 1);
    assert!(fx.registry.get(&idle.session_id).is_none());
    assert!(fx.registry.get(&fresh.session_id).is_some());

    let row = fx.store.session_row(&idle.session_id).unwrap().unwrap();
    assert_eq!(row.termination_reason.as_deref(), Some("idle_timeout"));
}

#[tokio::test]
async fn activity_defers_idle_eviction() {
    let fx = fixture();
    let snapshot = fx.registry.create(None, None).await.unwrap();

    fx.clock.advance(50.0);
    assert!(fx.registry.update_activity(&snapshot.session_id));
    fx.clock.advance(50.0);

    // 100s since create, but only 50s since the touch
    assert_eq!(fx.registry.reap_idle().await, 0);
    assert!(fx.registry.get(&snapshot.session_id).is_some());
}

#[tokio::test]
async fn shutdown_all_ends_every_session() {
    let fx = fixture();
    for _ in 0..3 {
        fx.registry.create(None, None).await.unwrap();
    }

    let count = fx.registry.shutdown_all().await;
    assert_eq!(count, 3);
    assert!(fx.registry.list().await.is_empty());
    assert_eq!(fx.registry.port_status().reserved_ports, 0);
    for worker in fx.supervisor.spawned() {
        assert!(!worker.is_alive());
    }

    // second call is a quiet no-op
    assert_eq!(fx.registry.shutdown_all().await, 0);
}

#[tokio::test]
async fn update_user_info_sets_display_name_and_persists() {
    let fx = fixture();
    let snapshot = fx.registry.create(None, None).await.unwrap();
    fx.clock.advance(5.0);

    let ok = fx.registry.update_user_info(
        &snapshot.session_id,
        "Ada",
        "Lovelace",
        Some("ada@example.com"),
    );
    assert!(ok);

    let updated = fx.registry.get(&snapshot.session_id).unwrap();
    assert_eq!(updated.user_display_name, "Ada Lovelace");
    assert_eq!(updated.user_email.as_deref(), Some("ada@example.com"));
    assert_eq!(updated.last_activity, 1_005.0);

    let row = fx.store.user_info_row(&snapshot.session_id).unwrap().unwrap();
    assert_eq!(row.first_name.as_deref(), Some("Ada"));
    assert_eq!(row.email.as_deref(), Some("ada@example.com"));

    assert!(!fx.registry.update_user_info(&SessionId::new("ghost"), "A", "B", None));
}

#[tokio::test]
async fn sample_memory_records_metric_and_touches_activity() {
    let fx = fixture();
    let snapshot = fx.registry.create(None, None).await.unwrap();
    let worker = fx.supervisor.last_spawned().unwrap();
    worker.set_memory_mib(123.5);
    fx.clock.advance(2.0);

    let mib = fx.registry.sample_memory(&snapshot.session_id);
    assert_eq!(mib, Some(123.5));

    let updated = fx.registry.get(&snapshot.session_id).unwrap();
    assert_eq!(updated.mem_used, 123.5);
    assert_eq!(updated.last_activity, 1_002.0);
    assert_eq!(fx.store.metric_count(&snapshot.session_id).unwrap(), 1);
}

#[tokio::test]
async fn sample_memory_of_dead_worker_is_none() {
    let fx = fixture();
    let snapshot = fx.registry.create(None, None).await.unwrap();
    fx.supervisor.last_spawned().unwrap().kill_externally();

    assert_eq!(fx.registry.sample_memory(&snapshot.session_id), None);
    // no metric row for the failed sample
    assert_eq!(fx.store.metric_count(&snapshot.session_id).unwrap(), 0);
}

#[tokio::test]
async fn route_exposes_port_and_serializing_gate() {
    let fx = fixture();
    let snapshot = fx.registry.create(None, None).await.unwrap();

    let route = fx.registry.route(&snapshot.session_id).unwrap();
    assert_eq!(route.port, snapshot.port);

    // both routes share one gate: holding it blocks the other
    let other = fx.registry.route(&snapshot.session_id).unwrap();
    let guard = route.gate.lock().await;
    assert!(other.gate.try_lock().is_err());
    drop(guard);
    assert!(other.gate.try_lock().is_ok());

    assert!(fx.registry.route(&SessionId::new("ghost")).is_none());
}

#[tokio::test]
async fn freed_ports_are_reused_fifo() {
    let fx = fixture_with(RegistrySettings {
        port_start: 5600,
        port_end: 5602,
        idle_timeout_seconds: 60.0,
    });

    let first = fx.registry.create(None, None).await.unwrap();
    assert_eq!(first.port, 5600);
    fx.registry.end(&first.session_id, TerminationReason::Manual).await;

    // 5601 is older in the queue than the just-released 5600
    let second = fx.registry.create(None, None).await.unwrap();
    assert_eq!(second.port, 5601);
    let third = fx.registry.create(None, None).await.unwrap();
    assert_eq!(third.port, 5600);
}
