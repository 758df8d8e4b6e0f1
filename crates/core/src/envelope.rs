// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker command envelope.
//!
//! A request is a command name plus free-form named arguments; the
//! broker forwards client payloads without inspecting the arguments.
//! Replies carry either a `result` value or an `error` string with an
//! optional detail trace.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A command addressed to a worker.
///
/// Serializes flat, `{"command": "set_value", "twig": "...", ...}`,
/// so the HTTP body routed by the broker is byte-for-byte the message
/// the worker receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Map::new(),
        }
    }

    /// The readiness probe message.
    pub fn ping() -> Self {
        Self::new("ping")
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Fetch a string argument by name.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

/// A worker's reply envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl WorkerReply {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            traceback: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            traceback: None,
        }
    }

    pub fn err_with_detail(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            traceback: Some(detail.into()),
        }
    }

    /// Fold a transport failure into the reply shape. The broker
    /// surfaces these in-band with HTTP 200; a failed send does not
    /// mean a dead session.
    pub fn transport_error(error: impl std::fmt::Display) -> Self {
        Self::err(error.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
