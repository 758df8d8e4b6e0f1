// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn request_serializes_flat() {
    let req = CommandRequest::new("set_value")
        .with_arg("twig", "period@binary")
        .with_arg("value", 2.5);
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(
        value,
        json!({"command": "set_value", "twig": "period@binary", "value": 2.5})
    );
}

#[test]
fn request_deserializes_extra_keys_as_args() {
    let req: CommandRequest =
        serde_json::from_value(json!({"command": "get_value", "twig": "incl@binary"})).unwrap();
    assert_eq!(req.command, "get_value");
    assert_eq!(req.str_arg("twig"), Some("incl@binary"));
    assert_eq!(req.str_arg("missing"), None);
}

#[test]
fn request_without_command_is_rejected() {
    let err = serde_json::from_value::<CommandRequest>(json!({"twig": "x"}));
    assert!(err.is_err());
}

#[test]
fn ok_reply_shape() {
    let reply = WorkerReply::ok(json!({"status": "ready"}));
    let value = serde_json::to_value(&reply).unwrap();
    assert_eq!(value, json!({"success": true, "result": {"status": "ready"}}));
}

#[test]
fn error_reply_shape() {
    let reply = WorkerReply::err_with_detail("boom", "at line 1");
    let value = serde_json::to_value(&reply).unwrap();
    assert_eq!(
        value,
        json!({"success": false, "error": "boom", "traceback": "at line 1"})
    );
}

#[test]
fn reply_optional_fields_default_to_none() {
    let reply: WorkerReply = serde_json::from_value(json!({"success": false})).unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.error, None);
    assert_eq!(reply.result, None);
}

#[test]
fn transport_error_is_unsuccessful() {
    let reply = WorkerReply::transport_error("connection refused");
    assert!(!reply.is_success());
    assert_eq!(reply.error.as_deref(), Some("connection refused"));
}
