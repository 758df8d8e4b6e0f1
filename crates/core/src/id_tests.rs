// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn display_roundtrip() {
    let id = SessionId::new("abc-123");
    assert_eq!(id.to_string(), "abc-123");
    assert_eq!(id.as_str(), "abc-123");
}

#[test]
fn generate_is_unique() {
    let a = SessionId::generate();
    let b = SessionId::generate();
    assert_ne!(a, b);
    // uuid4 text form
    assert_eq!(a.as_str().len(), 36);
}

#[test]
fn short_truncates() {
    let id = SessionId::new("abcdefgh");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefgh");
}

#[test]
fn serde_as_plain_string() {
    let id = SessionId::new("s-1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"s-1\"");
    let parsed: SessionId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn borrow_allows_str_map_lookup() {
    let mut map = HashMap::new();
    map.insert(SessionId::new("k"), 1);
    assert_eq!(map.get("k"), Some(&1));
}

#[test]
fn eq_against_str() {
    let id = SessionId::new("x");
    assert_eq!(id, *"x");
    assert_eq!(id, "x");
}
