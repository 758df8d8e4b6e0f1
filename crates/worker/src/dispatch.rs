// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch.
//!
//! Maps command names onto bundle operations and folds every outcome
//! into the reply envelope. Unknown commands and handler failures are
//! reported in-band; the serve loop never dies on a bad request.

use serde_json::{json, Value};
use thiserror::Error;

use orrery_core::{CommandRequest, WorkerReply};

use crate::bundle::{Bundle, BundleError};

#[derive(Debug, Error)]
enum DispatchError {
    #[error("engine does not recognize command '{0}'")]
    UnknownCommand(String),

    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("argument '{name}' has the wrong type: expected {expected}")]
    BadArgument {
        name: &'static str,
        expected: &'static str,
    },

    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// Stateful command handler owning the engine bundle.
pub struct Dispatcher {
    bundle: Bundle,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            bundle: Bundle::default_binary(),
        }
    }

    /// Handle one request, always producing a reply envelope.
    pub fn handle(&mut self, request: &CommandRequest) -> WorkerReply {
        match self.dispatch(request) {
            Ok(result) => WorkerReply::ok(result),
            Err(e @ DispatchError::UnknownCommand(_)) => WorkerReply::err(e.to_string()),
            Err(e) => WorkerReply::err_with_detail(e.to_string(), format!("{e:?}")),
        }
    }

    fn dispatch(&mut self, request: &CommandRequest) -> Result<Value, DispatchError> {
        match request.command.as_str() {
            "ping" => Ok(json!({"status": "ready"})),

            "get_parameter" => {
                let twig = require_str(request, "twig")?;
                Ok(self.bundle.get_parameter(twig)?.to_json())
            }

            "get_value" => {
                let twig = require_str(request, "twig")?;
                Ok(self.bundle.get_value(twig)?.to_json())
            }

            "set_value" => {
                let twig = require_str(request, "twig")?;
                let value = request
                    .args
                    .get("value")
                    .ok_or(DispatchError::MissingArgument("value"))?;
                self.bundle.set_value(twig, value)?;
                Ok(json!({}))
            }

            "add_dataset" => {
                let kind = request.str_arg("kind").unwrap_or("lc");
                let name = request.str_arg("dataset");
                let name = self.bundle.add_dataset(kind, name)?;
                Ok(json!({"dataset": name}))
            }

            "remove_dataset" => {
                let name = require_str(request, "dataset")?;
                self.bundle.remove_dataset(name)?;
                Ok(json!({}))
            }

            "get_datasets" => {
                let datasets: serde_json::Map<String, Value> = self
                    .bundle
                    .datasets()
                    .iter()
                    .map(|(name, kind)| (name.clone(), json!({"kind": kind})))
                    .collect();
                Ok(json!({"datasets": datasets}))
            }

            "save_bundle" | "get_bundle" => {
                let dump = serde_json::to_string(&self.bundle.to_json())
                    .unwrap_or_else(|_| "{}".to_string());
                Ok(json!({"bundle": dump}))
            }

            "load_bundle" => {
                let raw = require_str(request, "bundle")?;
                let parsed: Value = serde_json::from_str(raw).map_err(|_| {
                    DispatchError::BadArgument {
                        name: "bundle",
                        expected: "a JSON-encoded bundle dump",
                    }
                })?;
                self.bundle = Bundle::from_json(&parsed)?;
                Ok(json!({}))
            }

            "attach_parameters" => {
                let specs = request
                    .args
                    .get("parameters")
                    .ok_or(DispatchError::MissingArgument("parameters"))?
                    .as_array()
                    .ok_or(DispatchError::BadArgument {
                        name: "parameters",
                        expected: "an array of parameter specs",
                    })?;
                let unique_ids = self.bundle.attach_parameters(specs)?;
                Ok(json!({"unique_ids": unique_ids}))
            }

            "get_uniqueid" => {
                let twig = require_str(request, "twig")?;
                Ok(json!(self.bundle.uniqueid_of(twig)?))
            }

            "is_parameter_constrained" => {
                // addressable by twig or by uniqueid
                if let Some(twig) = request.str_arg("twig") {
                    Ok(json!(self.bundle.is_constrained(twig)?))
                } else if let Some(uniqueid) = request.str_arg("uniqueid") {
                    let param = self.bundle.find_by_uniqueid(uniqueid)?;
                    Ok(json!(!param.constrained_by.is_empty()))
                } else {
                    Err(DispatchError::MissingArgument("twig"))
                }
            }

            other => Err(DispatchError::UnknownCommand(other.to_string())),
        }
    }
}

fn require_str<'a>(
    request: &'a CommandRequest,
    name: &'static str,
) -> Result<&'a str, DispatchError> {
    match request.args.get(name) {
        Some(value) => value.as_str().ok_or(DispatchError::BadArgument {
            name,
            expected: "a string",
        }),
        None => Err(DispatchError::MissingArgument(name)),
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
