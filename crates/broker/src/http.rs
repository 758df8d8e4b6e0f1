// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP facade over the session registry.
//!
//! Handlers are stateless translations from requests to registry
//! operations. Worker replies are forwarded verbatim; transport
//! failures surface as `{success: false}` bodies with HTTP 200, since
//! the request did reach the broker. Everything except the health
//! probe sits behind the API-key gate.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, FromRequestParts, Path, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use orrery_core::{CommandRequest, SessionId};
use orrery_store::SessionStore;
use orrery_supervisor::{proxy, Supervisor};

use crate::ports::PortStatus;
use crate::registry::{RegistryError, SessionRegistry, SessionSnapshot, TerminationReason};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state handed to every handler.
pub struct ApiState<S> {
    pub registry: Arc<SessionRegistry<S>>,
    pub store: Arc<SessionStore>,
    /// `None` leaves the gate open (dev mode).
    pub api_key: Option<String>,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            api_key: self.api_key.clone(),
        }
    }
}

/// Build the full route table.
pub fn router<S: Supervisor>(state: ApiState<S>) -> Router {
    let gated = Router::new()
        .route("/start-session", post(start_session::<S>))
        .route("/end-session/{session_id}", post(end_session::<S>))
        .route("/sessions", get(list_sessions::<S>))
        .route("/update-user-info/{session_id}", post(update_user_info::<S>))
        .route("/session-memory", get(session_memory_all::<S>))
        .route("/session-memory/{session_id}", post(session_memory::<S>))
        .route("/port-status", get(port_status::<S>))
        .route("/send/{session_id}", post(send::<S>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key::<S>,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject gated requests without the configured key.
async fn require_api_key<S: Supervisor>(
    State(state): State<ApiState<S>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return error_body(StatusCode::UNAUTHORIZED, "Invalid or missing API key");
        }
    }
    next.run(request).await
}

/// Peer address, when the transport recorded one.
struct ClientAddr(Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

/// First `X-Forwarded-For` entry wins; fall back to the peer address,
/// then to `"unknown"`.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

fn error_body(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({"detail": detail}))).into_response()
}

fn session_not_found() -> Response {
    error_body(StatusCode::NOT_FOUND, "Session not found")
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn start_session<S: Supervisor>(
    State(state): State<ApiState<S>>,
    ClientAddr(peer): ClientAddr,
    headers: HeaderMap,
) -> Response {
    let ip = client_ip(&headers, peer);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.registry.create(Some(ip), user_agent).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(RegistryError::NoCapacity) => {
            error_body(StatusCode::SERVICE_UNAVAILABLE, "No available ports in pool")
        }
        Err(e @ RegistryError::SpawnFailed { .. }) => {
            error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn end_session<S: Supervisor>(
    State(state): State<ApiState<S>>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = SessionId::new(session_id);
    if state
        .registry
        .end(&session_id, TerminationReason::Manual)
        .await
    {
        Json(json!({"success": true})).into_response()
    } else {
        session_not_found()
    }
}

async fn list_sessions<S: Supervisor>(
    State(state): State<ApiState<S>>,
) -> Json<HashMap<SessionId, SessionSnapshot>> {
    // idle sessions are cleaned up before the list is taken
    state.registry.reap_idle().await;
    Json(state.registry.list().await)
}

#[derive(Debug, Deserialize)]
struct UserInfoBody {
    first_name: String,
    last_name: String,
    #[serde(default)]
    email: Option<String>,
}

async fn update_user_info<S: Supervisor>(
    State(state): State<ApiState<S>>,
    Path(session_id): Path<String>,
    Json(body): Json<UserInfoBody>,
) -> Response {
    let session_id = SessionId::new(session_id);
    let updated = state.registry.update_user_info(
        &session_id,
        &body.first_name,
        &body.last_name,
        body.email.as_deref(),
    );
    if updated {
        Json(json!({"success": true})).into_response()
    } else {
        session_not_found()
    }
}

async fn session_memory_all<S: Supervisor>(
    State(state): State<ApiState<S>>,
) -> Json<HashMap<SessionId, f64>> {
    let sessions = state.registry.list().await;
    let mut memory = HashMap::new();
    for session_id in sessions.keys() {
        if let Some(mib) = state.registry.sample_memory(session_id) {
            memory.insert(session_id.clone(), mib);
        }
    }
    Json(memory)
}

async fn session_memory<S: Supervisor>(
    State(state): State<ApiState<S>>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = SessionId::new(session_id);
    match state.registry.sample_memory(&session_id) {
        Some(mib) => Json(json!({"mem_used": mib})).into_response(),
        None => session_not_found(),
    }
}

async fn port_status<S: Supervisor>(State(state): State<ApiState<S>>) -> Json<PortStatus> {
    Json(state.registry.port_status())
}

/// The routed-command pipeline: resolve, touch activity, forward to
/// the worker under the session's RPC gate, log the command, sample
/// memory, and return the worker's reply verbatim.
async fn send<S: Supervisor>(
    State(state): State<ApiState<S>>,
    Path(session_id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Response {
    let session_id = SessionId::new(session_id);
    let Some(route) = state.registry.route(&session_id) else {
        return error_body(StatusCode::NOT_FOUND, "Invalid session ID");
    };

    state.registry.update_activity(&session_id);

    let started = Instant::now();
    let reply = {
        // one outstanding request per worker
        let _serialized = route.gate.lock().await;
        proxy::send_command(route.port, &request, proxy::RPC_TIMEOUT).await
    };
    let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

    let error_message = if reply.success {
        None
    } else {
        reply.error.clone()
    };
    state.store.log_command_execution(
        &session_id,
        state.registry.now_epoch(),
        &request.command,
        reply.success,
        Some(execution_time_ms),
        error_message.as_deref(),
    );

    // memory poll after every routed command
    state.registry.sample_memory(&session_id);

    Json(reply).into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
