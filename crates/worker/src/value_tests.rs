// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn scalars_normalize_to_plain_json() {
    assert_eq!(EngineValue::Int(7).to_json(), json!(7));
    assert_eq!(EngineValue::Float(2.5).to_json(), json!(2.5));
    assert_eq!(EngineValue::Bool(true).to_json(), json!(true));
    assert_eq!(EngineValue::Str("lc".into()).to_json(), json!("lc"));
}

#[test]
fn quantities_render_as_value_unit_objects() {
    let q = EngineValue::quantity(2.5, "d");
    assert_eq!(q.to_json(), json!({"value": 2.5, "unit": "d"}));
}

#[test]
fn nested_containers_recurse() {
    let mut map = BTreeMap::new();
    map.insert(
        "period".to_string(),
        EngineValue::quantity(2.5, "d"),
    );
    map.insert(
        "teffs".to_string(),
        EngineValue::Array(vec![EngineValue::Int(6000), EngineValue::Int(5800)]),
    );
    let value = EngineValue::Map(map);
    assert_eq!(
        value.to_json(),
        json!({
            "period": {"value": 2.5, "unit": "d"},
            "teffs": [6000, 5800],
        })
    );
}

#[test]
fn from_json_collapses_number_widths() {
    assert_eq!(EngineValue::from_json(&json!(3)), EngineValue::Int(3));
    assert_eq!(EngineValue::from_json(&json!(3.5)), EngineValue::Float(3.5));
}

#[test]
fn from_json_recovers_quantities() {
    let parsed = EngineValue::from_json(&json!({"value": 8.0, "unit": "solRad"}));
    assert_eq!(parsed, EngineValue::quantity(8.0, "solRad"));
}

#[test]
fn plain_objects_stay_maps() {
    let parsed = EngineValue::from_json(&json!({"kind": "lc", "points": 100}));
    let EngineValue::Map(map) = parsed else {
        panic!("expected a map");
    };
    assert_eq!(map.get("kind"), Some(&EngineValue::Str("lc".into())));
    assert_eq!(map.get("points"), Some(&EngineValue::Int(100)));
}

#[test]
fn null_passes_through_unchanged() {
    let parsed = EngineValue::from_json(&Value::Null);
    assert_eq!(parsed.to_json(), Value::Null);
}

#[test]
fn roundtrip_preserves_shape() {
    let original = json!({
        "model": {
            "lc01": {"times": [0.0, 0.1], "fluxes": [1.0, 0.99]},
        },
        "converged": true,
    });
    let roundtripped = EngineValue::from_json(&original).to_json();
    assert_eq!(roundtripped, original);
}

#[test]
fn as_f64_unwraps_quantities() {
    assert_eq!(EngineValue::quantity(2.5, "d").as_f64(), Some(2.5));
    assert_eq!(EngineValue::Int(3).as_f64(), Some(3.0));
    assert_eq!(EngineValue::Str("x".into()).as_f64(), None);
}
