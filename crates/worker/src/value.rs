// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine value normalization.
//!
//! Engine results collapse to one JSON-expressible shape before they
//! cross the wire: a single integer width, a single float width,
//! quantities as `{value, unit}` objects, containers recursed. Leaf
//! shapes the engine does not model pass through unchanged.

use std::collections::BTreeMap;

use serde_json::{json, Number, Value};

/// A value held by the engine bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// A number carrying a physical unit.
    Quantity {
        value: Box<EngineValue>,
        unit: String,
    },
    Array(Vec<EngineValue>),
    Map(BTreeMap<String, EngineValue>),
    /// Unmodeled leaf, forwarded as-is.
    Raw(Value),
}

impl EngineValue {
    pub fn quantity(value: f64, unit: impl Into<String>) -> Self {
        Self::Quantity {
            value: Box::new(Self::Float(value)),
            unit: unit.into(),
        }
    }

    /// Normalized JSON rendering.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::Bool(b) => json!(b),
            Self::Str(s) => json!(s),
            Self::Quantity { value, unit } => json!({
                "value": value.to_json(),
                "unit": unit,
            }),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Raw(v) => v.clone(),
        }
    }

    /// Rebuild from JSON. Integers collapse to `i64`, other numbers
    /// to `f64`; `{value, unit}` objects come back as quantities.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::from_number(n),
            Value::String(s) => Self::Str(s.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => {
                if let Some(quantity) = Self::quantity_from_object(map) {
                    return quantity;
                }
                Self::Map(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Self::from_json(v)))
                        .collect(),
                )
            }
            Value::Null => Self::Raw(Value::Null),
        }
    }

    fn from_number(n: &Number) -> Self {
        if let Some(i) = n.as_i64() {
            Self::Int(i)
        } else {
            Self::Float(n.as_f64().unwrap_or(f64::NAN))
        }
    }

    fn quantity_from_object(map: &serde_json::Map<String, Value>) -> Option<Self> {
        if map.len() != 2 {
            return None;
        }
        let unit = map.get("unit")?.as_str()?;
        let value = map.get("value")?;
        Some(Self::Quantity {
            value: Box::new(Self::from_json(value)),
            unit: unit.to_string(),
        })
    }

    /// Numeric view, unwrapping quantities.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Quantity { value, .. } => value.as_f64(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
