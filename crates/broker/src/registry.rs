// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry: the authoritative runtime state.
//!
//! One mutex covers the session map and the port pool so lifecycle
//! transitions move both atomically. Worker spawn (with its 30 s
//! readiness probe) and worker termination never run under that lock;
//! creates hold it just long enough to reserve a port and a
//! placeholder, ends just long enough to take the entry out.
//!
//! The durable store is written after the fact and best-effort: a
//! failed audit write never unwinds a lifecycle transition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use orrery_core::{Clock, SessionId};
use orrery_store::SessionStore;
use orrery_supervisor::{Supervisor, SupervisorError, WorkerProcess};

use crate::ports::{PortPool, PortStatus};

/// Grace period granted to a worker on session end.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Display name shown before any user info arrives.
const ANONYMOUS_DISPLAY_NAME: &str = "Not logged in";

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Manual,
    IdleTimeout,
    ServerShutdown,
    DeadProcess,
}

impl TerminationReason {
    /// The string stored in the `sessions` table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::IdleTimeout => "idle_timeout",
            Self::ServerShutdown => "server_shutdown",
            Self::DeadProcess => "dead_process",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no available ports in pool")]
    NoCapacity,

    #[error("worker failed to start on port {port}: {source}")]
    SpawnFailed {
        port: u16,
        #[source]
        source: SupervisorError,
    },
}

/// Registry tuning, usually derived from the broker config.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub port_start: u16,
    pub port_end: u16,
    pub idle_timeout_seconds: f64,
}

/// Serializable projection of a session. Excludes the worker handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub created_at: f64,
    pub last_activity: f64,
    pub port: u16,
    pub mem_used: f64,
    pub user_first_name: Option<String>,
    pub user_last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub user_display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Routing info for one RPC: the worker port and the gate that
/// serializes requests to it.
pub struct Route {
    pub port: u16,
    pub gate: Arc<tokio::sync::Mutex<()>>,
}

struct ActiveSession {
    session_id: SessionId,
    created_at: f64,
    last_activity: f64,
    port: u16,
    mem_used: f64,
    user_first_name: Option<String>,
    user_last_name: Option<String>,
    user_email: Option<String>,
    user_display_name: String,
    client_ip: Option<String>,
    user_agent: Option<String>,
    handle: Box<dyn WorkerProcess>,
    rpc_gate: Arc<tokio::sync::Mutex<()>>,
}

impl ActiveSession {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            port: self.port,
            mem_used: self.mem_used,
            user_first_name: self.user_first_name.clone(),
            user_last_name: self.user_last_name.clone(),
            user_email: self.user_email.clone(),
            user_display_name: self.user_display_name.clone(),
            client_ip: self.client_ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// A registry slot. `Pending` reserves the id and port while the
/// worker spawn is still in flight; only `Active` entries route.
enum SessionEntry {
    Pending { port: u16 },
    Active(Box<ActiveSession>),
}

struct Inner {
    sessions: HashMap<SessionId, SessionEntry>,
    ports: PortPool,
}

/// In-memory session table plus port pool, shared by every handler.
pub struct SessionRegistry<S> {
    inner: Mutex<Inner>,
    supervisor: S,
    store: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    idle_timeout_seconds: f64,
}

impl<S: Supervisor> SessionRegistry<S> {
    pub fn new(
        supervisor: S,
        store: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                ports: PortPool::new(settings.port_start, settings.port_end),
            }),
            supervisor,
            store,
            clock,
            idle_timeout_seconds: settings.idle_timeout_seconds,
        }
    }

    /// Current wall-clock seconds, from the registry's clock.
    pub fn now_epoch(&self) -> f64 {
        self.clock.epoch_secs()
    }

    /// Create a session: reserve a port, spawn and probe a worker,
    /// then activate the entry. The registry lock is held only for
    /// the reserve and activate steps, never across the spawn.
    pub async fn create(
        &self,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<SessionSnapshot, RegistryError> {
        let session_id = SessionId::generate();

        let port = {
            let mut inner = self.inner.lock();
            let port = inner.ports.request().map_err(|_| RegistryError::NoCapacity)?;
            inner
                .sessions
                .insert(session_id.clone(), SessionEntry::Pending { port });
            port
        };

        let handle = match self.supervisor.spawn(port).await {
            Ok(handle) => handle,
            Err(source) => {
                {
                    let mut inner = self.inner.lock();
                    inner.sessions.remove(&session_id);
                    inner.ports.release(port);
                }
                error!(session_id = %session_id, port, error = %source, "failed to launch worker");
                return Err(RegistryError::SpawnFailed { port, source });
            }
        };

        let now = self.clock.epoch_secs();
        let snapshot = {
            let mut inner = self.inner.lock();
            let session = ActiveSession {
                session_id: session_id.clone(),
                created_at: now,
                last_activity: now,
                port,
                mem_used: 0.0,
                user_first_name: None,
                user_last_name: None,
                user_email: None,
                user_display_name: ANONYMOUS_DISPLAY_NAME.to_string(),
                client_ip: client_ip.clone(),
                user_agent: user_agent.clone(),
                handle,
                rpc_gate: Arc::new(tokio::sync::Mutex::new(())),
            };
            let snapshot = session.snapshot();
            inner
                .sessions
                .insert(session_id.clone(), SessionEntry::Active(Box::new(session)));
            snapshot
        };

        self.store.log_session_created(
            &session_id,
            now,
            port,
            client_ip.as_deref(),
            user_agent.as_deref(),
        );
        info!(session_id = %session_id, port, "started session");
        Ok(snapshot)
    }

    /// End a session: take the entry out, then terminate the worker,
    /// release the port, and record the destruction. Entry removal
    /// comes first so concurrent routers cannot reach a dying worker.
    /// Returns false for unknown (or still-pending) sessions.
    pub async fn end(&self, session_id: &SessionId, reason: TerminationReason) -> bool {
        let entry = {
            let mut inner = self.inner.lock();
            match inner.sessions.remove(session_id) {
                Some(SessionEntry::Pending { port }) => {
                    // spawn still in flight; not endable yet
                    inner
                        .sessions
                        .insert(session_id.clone(), SessionEntry::Pending { port });
                    return false;
                }
                other => other,
            }
        };

        let Some(SessionEntry::Active(session)) = entry else {
            return false;
        };

        session.handle.terminate(TERMINATE_GRACE).await;

        {
            let mut inner = self.inner.lock();
            inner.ports.release(session.port);
        }

        self.store
            .log_session_destroyed(session_id, self.clock.epoch_secs(), reason.as_str());
        info!(session_id = %session_id, reason = %reason, "ended session");
        true
    }

    pub fn get(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        let inner = self.inner.lock();
        match inner.sessions.get(session_id) {
            Some(SessionEntry::Active(session)) => Some(session.snapshot()),
            _ => None,
        }
    }

    /// Routing info for `/send`. Pending entries do not route.
    pub fn route(&self, session_id: &SessionId) -> Option<Route> {
        let inner = self.inner.lock();
        match inner.sessions.get(session_id) {
            Some(SessionEntry::Active(session)) => Some(Route {
                port: session.port,
                gate: Arc::clone(&session.rpc_gate),
            }),
            _ => None,
        }
    }

    /// All active sessions. Sessions whose worker died out from under
    /// the broker are ended first (reason `dead_process`), which makes
    /// listing a weak form of self-healing.
    pub async fn list(&self) -> HashMap<SessionId, SessionSnapshot> {
        let dead: Vec<SessionId> = {
            let inner = self.inner.lock();
            inner
                .sessions
                .iter()
                .filter_map(|(id, entry)| match entry {
                    SessionEntry::Active(session) if !session.handle.is_alive() => {
                        Some(id.clone())
                    }
                    _ => None,
                })
                .collect()
        };

        for session_id in dead {
            warn!(session_id = %session_id, "worker process died, evicting session");
            self.end(&session_id, TerminationReason::DeadProcess).await;
        }

        let inner = self.inner.lock();
        inner
            .sessions
            .iter()
            .filter_map(|(id, entry)| match entry {
                SessionEntry::Active(session) => Some((id.clone(), session.snapshot())),
                _ => None,
            })
            .collect()
    }

    /// Touch a session's activity clock. Returns false when unknown.
    pub fn update_activity(&self, session_id: &SessionId) -> bool {
        let now = self.clock.epoch_secs();
        let touched = {
            let mut inner = self.inner.lock();
            match inner.sessions.get_mut(session_id) {
                Some(SessionEntry::Active(session)) => {
                    session.last_activity = now;
                    true
                }
                _ => false,
            }
        };
        if touched {
            self.store.log_session_activity(session_id, now);
        }
        touched
    }

    /// Upsert user metadata. The durable row is authoritative; the
    /// registry copy feeds the session list display.
    pub fn update_user_info(
        &self,
        session_id: &SessionId,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
    ) -> bool {
        let now = self.clock.epoch_secs();
        let updated = {
            let mut inner = self.inner.lock();
            match inner.sessions.get_mut(session_id) {
                Some(SessionEntry::Active(session)) => {
                    session.user_first_name = Some(first_name.to_string());
                    session.user_last_name = Some(last_name.to_string());
                    session.user_email = email.map(str::to_string);
                    session.user_display_name = format!("{first_name} {last_name}");
                    session.last_activity = now;
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.store.log_session_activity(session_id, now);
            self.store
                .log_user_info_update(session_id, first_name, last_name, email, now);
        }
        updated
    }

    /// Sample the worker's resident memory, refresh the cached value,
    /// and record a metric. Also counts as activity: a routed command
    /// touches the activity clock twice, once before the RPC and once
    /// here.
    pub fn sample_memory(&self, session_id: &SessionId) -> Option<f64> {
        let now = self.clock.epoch_secs();
        let mib = {
            let mut inner = self.inner.lock();
            let session = match inner.sessions.get_mut(session_id) {
                Some(SessionEntry::Active(session)) => session,
                _ => return None,
            };
            let mib = session.handle.memory_mib()?;
            session.mem_used = mib;
            session.last_activity = now;
            mib
        };

        self.store.log_session_activity(session_id, now);
        self.store.log_session_metric(session_id, now, mib);
        Some(mib)
    }

    /// Evict sessions idle past the configured timeout. Candidates
    /// are snapshotted under the lock; terminations run outside it.
    pub async fn reap_idle(&self) -> usize {
        let now = self.clock.epoch_secs();
        let idle: Vec<(SessionId, f64)> = {
            let inner = self.inner.lock();
            inner
                .sessions
                .iter()
                .filter_map(|(id, entry)| match entry {
                    SessionEntry::Active(session) => {
                        let idle_for = now - session.last_activity;
                        (idle_for > self.idle_timeout_seconds).then(|| (id.clone(), idle_for))
                    }
                    _ => None,
                })
                .collect()
        };

        for (session_id, idle_for) in &idle {
            info!(session_id = %session_id, idle_secs = %format!("{idle_for:.0}"), "session idle, shutting down");
            self.end(session_id, TerminationReason::IdleTimeout).await;
        }
        idle.len()
    }

    /// End every active session with reason `server_shutdown`. A
    /// failure to end one session does not stop the rest.
    pub async fn shutdown_all(&self) -> usize {
        let ids: Vec<SessionId> = {
            let inner = self.inner.lock();
            inner
                .sessions
                .iter()
                .filter_map(|(id, entry)| match entry {
                    SessionEntry::Active(_) => Some(id.clone()),
                    _ => None,
                })
                .collect()
        };

        if ids.is_empty() {
            info!("no active sessions to shut down");
            return 0;
        }

        info!(count = ids.len(), "shutting down all active sessions");
        for session_id in &ids {
            if !self.end(session_id, TerminationReason::ServerShutdown).await {
                warn!(session_id = %session_id, "session vanished during shutdown");
            }
        }
        ids.len()
    }

    pub fn port_status(&self) -> PortStatus {
        self.inner.lock().ports.status()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
