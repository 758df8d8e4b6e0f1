// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed session store.
//!
//! One connection behind a mutex; WAL journaling so dashboard readers
//! never block broker writes. Every write path logs and swallows its
//! error: the registry is authoritative and an audit failure must not
//! fail the HTTP request that produced it.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, error, info};

use orrery_core::SessionId;

use crate::filter::CommandFilter;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Busy handler timeout, matching the broker's tolerance for a slow
/// concurrent reader.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    created_at REAL NOT NULL,
    destroyed_at REAL,
    last_activity REAL NOT NULL,
    port INTEGER NOT NULL,
    client_ip TEXT,
    user_agent TEXT,
    termination_reason TEXT,
    status TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS session_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    timestamp REAL NOT NULL,
    memory_used_mb REAL NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions (session_id)
);

CREATE TABLE IF NOT EXISTS session_commands (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    timestamp REAL NOT NULL,
    command_name TEXT NOT NULL,
    success INTEGER NOT NULL,
    execution_time_ms REAL,
    error_message TEXT,
    FOREIGN KEY (session_id) REFERENCES sessions (session_id)
);

CREATE TABLE IF NOT EXISTS session_user_info (
    session_id TEXT PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    email TEXT,
    updated_at REAL NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions (session_id)
);

CREATE INDEX IF NOT EXISTS idx_sessions_created_at
    ON sessions (created_at);
CREATE INDEX IF NOT EXISTS idx_sessions_status
    ON sessions (status);
CREATE INDEX IF NOT EXISTS idx_session_commands_session_id
    ON session_commands (session_id);
CREATE INDEX IF NOT EXISTS idx_session_metrics_session_id
    ON session_metrics (session_id);
";

/// Durable append-only log of session events.
pub struct SessionStore {
    conn: Mutex<Connection>,
    filter: CommandFilter,
}

/// Projection of a `sessions` row.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub session_id: SessionId,
    pub created_at: f64,
    pub destroyed_at: Option<f64>,
    pub last_activity: f64,
    pub port: u16,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub termination_reason: Option<String>,
    pub status: String,
}

/// Projection of a `session_commands` row.
#[derive(Debug, Clone)]
pub struct CommandRow {
    pub timestamp: f64,
    pub command_name: String,
    pub success: bool,
    pub execution_time_ms: Option<f64>,
    pub error_message: Option<String>,
}

/// Projection of a `session_user_info` row.
#[derive(Debug, Clone)]
pub struct UserInfoRow {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub updated_at: f64,
}

impl SessionStore {
    /// Open (creating if needed) the database at `path` and apply the
    /// schema. Enables WAL journaling for concurrent readers.
    pub fn open(path: &Path, filter: CommandFilter) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        // journal_mode returns the resulting mode as a row
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "session store initialized");
        Ok(Self {
            conn: Mutex::new(conn),
            filter,
        })
    }

    /// Whether a command of this name is persisted at all.
    pub fn should_log_command(&self, command: &str) -> bool {
        self.filter.should_log(command)
    }

    // --- write paths: best-effort, never surfaced ---

    pub fn log_session_created(
        &self,
        session_id: &SessionId,
        created_at: f64,
        port: u16,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) {
        let result = self.conn.lock().execute(
            "INSERT INTO sessions
             (session_id, created_at, last_activity, port, client_ip, user_agent, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active')",
            params![
                session_id.as_str(),
                created_at,
                created_at,
                i64::from(port),
                client_ip,
                user_agent
            ],
        );
        match result {
            Ok(_) => debug!(session_id = %session_id, "logged session creation"),
            Err(e) => {
                error!(session_id = %session_id, error = %e, "failed to log session creation");
            }
        }
    }

    pub fn log_session_destroyed(
        &self,
        session_id: &SessionId,
        destroyed_at: f64,
        termination_reason: &str,
    ) {
        let result = self.conn.lock().execute(
            "UPDATE sessions
             SET destroyed_at = ?1, termination_reason = ?2, status = 'terminated'
             WHERE session_id = ?3",
            params![destroyed_at, termination_reason, session_id.as_str()],
        );
        match result {
            Ok(_) => debug!(session_id = %session_id, "logged session destruction"),
            Err(e) => {
                error!(session_id = %session_id, error = %e, "failed to log session destruction");
            }
        }
    }

    pub fn log_session_activity(&self, session_id: &SessionId, last_activity: f64) {
        let result = self.conn.lock().execute(
            "UPDATE sessions SET last_activity = ?1 WHERE session_id = ?2",
            params![last_activity, session_id.as_str()],
        );
        if let Err(e) = result {
            error!(session_id = %session_id, error = %e, "failed to log session activity");
        }
    }

    pub fn log_session_metric(&self, session_id: &SessionId, timestamp: f64, memory_used_mb: f64) {
        let result = self.conn.lock().execute(
            "INSERT INTO session_metrics (session_id, timestamp, memory_used_mb)
             VALUES (?1, ?2, ?3)",
            params![session_id.as_str(), timestamp, memory_used_mb],
        );
        if let Err(e) = result {
            error!(session_id = %session_id, error = %e, "failed to log session metric");
        }
    }

    /// Record one routed command, subject to the configured filter.
    pub fn log_command_execution(
        &self,
        session_id: &SessionId,
        timestamp: f64,
        command_name: &str,
        success: bool,
        execution_time_ms: Option<f64>,
        error_message: Option<&str>,
    ) {
        if !self.filter.should_log(command_name) {
            return;
        }

        let result = self.conn.lock().execute(
            "INSERT INTO session_commands
             (session_id, timestamp, command_name, success, execution_time_ms, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id.as_str(),
                timestamp,
                command_name,
                i64::from(success),
                execution_time_ms,
                error_message
            ],
        );
        if let Err(e) = result {
            error!(session_id = %session_id, error = %e, "failed to log command execution");
        }
    }

    pub fn log_user_info_update(
        &self,
        session_id: &SessionId,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
        updated_at: f64,
    ) {
        let result = self.conn.lock().execute(
            "INSERT OR REPLACE INTO session_user_info
             (session_id, first_name, last_name, email, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id.as_str(),
                first_name,
                last_name,
                email,
                updated_at
            ],
        );
        if let Err(e) = result {
            error!(session_id = %session_id, error = %e, "failed to log user info update");
        }
    }

    // --- read paths: loud, used by dashboards and tests ---

    pub fn session_row(&self, session_id: &SessionId) -> Result<Option<SessionRow>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT session_id, created_at, destroyed_at, last_activity, port,
                        client_ip, user_agent, termination_reason, status
                 FROM sessions WHERE session_id = ?1",
                params![session_id.as_str()],
                |row| {
                    Ok(SessionRow {
                        session_id: SessionId::new(row.get::<_, String>(0)?),
                        created_at: row.get(1)?,
                        destroyed_at: row.get(2)?,
                        last_activity: row.get(3)?,
                        port: row.get::<_, i64>(4)? as u16,
                        client_ip: row.get(5)?,
                        user_agent: row.get(6)?,
                        termination_reason: row.get(7)?,
                        status: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Command rows for one session in insertion order.
    pub fn command_rows(&self, session_id: &SessionId) -> Result<Vec<CommandRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, command_name, success, execution_time_ms, error_message
             FROM session_commands WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![session_id.as_str()], |row| {
                Ok(CommandRow {
                    timestamp: row.get(0)?,
                    command_name: row.get(1)?,
                    success: row.get::<_, i64>(2)? != 0,
                    execution_time_ms: row.get(3)?,
                    error_message: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn metric_count(&self, session_id: &SessionId) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM session_metrics WHERE session_id = ?1",
            params![session_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn user_info_row(&self, session_id: &SessionId) -> Result<Option<UserInfoRow>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT first_name, last_name, email, updated_at
                 FROM session_user_info WHERE session_id = ?1",
                params![session_id.as_str()],
                |row| {
                    Ok(UserInfoRow {
                        first_name: row.get(0)?,
                        last_name: row.get(1)?,
                        email: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn active_session_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
