// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory model bundle.
//!
//! The worker's engine state: a parameter set addressed by twigs
//! (`qualifier@component` paths) plus attached datasets. Seeded with
//! a default detached binary model. The broker never sees this type;
//! it only routes opaque commands at it.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::value::EngineValue;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("no parameter matches twig '{0}'")]
    UnknownParameter(String),

    #[error("twig '{twig}' is ambiguous: matches {matches:?}")]
    Ambiguous { twig: String, matches: Vec<String> },

    #[error("cannot set constrained parameter '{0}'")]
    Constrained(String),

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("dataset '{0}' already exists")]
    DuplicateDataset(String),

    #[error("unsupported parameter type: {0}")]
    UnsupportedParameterType(String),

    #[error("no parameter with uniqueid '{0}'")]
    UnknownUniqueId(String),

    #[error("invalid bundle payload: {0}")]
    InvalidBundle(String),
}

/// Parameter kinds the engine models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Float,
    Int,
    Bool,
    String,
    Choice,
}

impl ParameterKind {
    /// Class name reported over the wire.
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Float => "FloatParameter",
            Self::Int => "IntParameter",
            Self::Bool => "BoolParameter",
            Self::String => "StringParameter",
            Self::Choice => "ChoiceParameter",
        }
    }

    pub fn from_ptype(ptype: &str) -> Option<Self> {
        match ptype {
            "float" => Some(Self::Float),
            "int" => Some(Self::Int),
            "bool" => Some(Self::Bool),
            "string" => Some(Self::String),
            "choice" => Some(Self::Choice),
            _ => None,
        }
    }

    fn from_class_name(class: &str) -> Option<Self> {
        match class {
            "FloatParameter" => Some(Self::Float),
            "IntParameter" => Some(Self::Int),
            "BoolParameter" => Some(Self::Bool),
            "StringParameter" => Some(Self::String),
            "ChoiceParameter" => Some(Self::Choice),
            _ => None,
        }
    }
}

/// One bundle parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub twig: String,
    pub qualifier: String,
    pub kind: ParameterKind,
    pub value: EngineValue,
    pub unit: Option<String>,
    pub description: String,
    pub choices: Vec<String>,
    /// Twigs this parameter is derived from; non-empty means read-only.
    pub constrained_by: Vec<String>,
    pub uniqueid: String,
}

impl Parameter {
    fn float(twig: &str, value: f64, unit: Option<&str>, description: &str) -> Self {
        let qualifier = twig.split('@').next().unwrap_or(twig).to_string();
        Self {
            twig: twig.to_string(),
            qualifier,
            kind: ParameterKind::Float,
            value: EngineValue::Float(value),
            unit: unit.map(str::to_string),
            description: description.to_string(),
            choices: Vec::new(),
            constrained_by: Vec::new(),
            uniqueid: new_uniqueid(),
        }
    }

    fn constrained(mut self, by: &[&str]) -> Self {
        self.constrained_by = by.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Wire form, matching the shape clients receive from
    /// `get_parameter`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("twig".into(), json!(self.twig));
        obj.insert("qualifier".into(), json!(self.qualifier));
        obj.insert("description".into(), json!(self.description));
        obj.insert("value".into(), self.value.to_json());
        if let Some(unit) = &self.unit {
            obj.insert("unit".into(), json!(unit));
        }
        if self.kind == ParameterKind::Choice {
            obj.insert("choices".into(), json!(self.choices));
        }
        obj.insert("constrained_by".into(), json!(self.constrained_by));
        obj.insert("uniqueid".into(), json!(self.uniqueid));
        obj.insert("Class".into(), json!(self.kind.class_name()));
        Value::Object(obj)
    }

    fn from_json(value: &Value) -> Result<Self, BundleError> {
        let obj = value
            .as_object()
            .ok_or_else(|| BundleError::InvalidBundle("parameter is not an object".into()))?;
        let field = |key: &str| -> Result<&Value, BundleError> {
            obj.get(key)
                .ok_or_else(|| BundleError::InvalidBundle(format!("parameter missing '{key}'")))
        };
        let str_field = |key: &str| -> Result<String, BundleError> {
            field(key)?
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| BundleError::InvalidBundle(format!("'{key}' is not a string")))
        };

        let class = str_field("Class")?;
        let kind = ParameterKind::from_class_name(&class)
            .ok_or_else(|| BundleError::InvalidBundle(format!("unknown Class '{class}'")))?;
        let choices = obj
            .get("choices")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let constrained_by = obj
            .get("constrained_by")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            twig: str_field("twig")?,
            qualifier: str_field("qualifier")?,
            kind,
            value: EngineValue::from_json(field("value")?),
            unit: obj.get("unit").and_then(Value::as_str).map(str::to_string),
            description: str_field("description")?,
            choices,
            constrained_by,
            uniqueid: str_field("uniqueid")?,
        })
    }
}

fn new_uniqueid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// The engine state owned by one worker.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    parameters: BTreeMap<String, Parameter>,
    /// dataset name -> kind (`lc`, `rv`, ...)
    datasets: BTreeMap<String, String>,
}

impl Bundle {
    /// Default detached binary model. Mass parameters are free; the
    /// mass ratio and semi-major axis are derived from them.
    pub fn default_binary() -> Self {
        let mut bundle = Bundle::default();
        let params = [
            Parameter::float("period@binary", 2.5, Some("d"), "Orbital period"),
            Parameter::float(
                "t0_supconj@binary",
                0.0,
                Some("d"),
                "Time of superior conjunction",
            ),
            Parameter::float("incl@binary", 89.0, Some("deg"), "Orbital inclination"),
            Parameter::float("ecc@binary", 0.0, None, "Eccentricity"),
            Parameter::float("sma@binary", 8.0, Some("solRad"), "Semi-major axis")
                .constrained(&["mass@primary", "mass@secondary", "period@binary"]),
            Parameter::float("q@binary", 1.0, None, "Mass ratio")
                .constrained(&["mass@primary", "mass@secondary"]),
            Parameter::float("mass@primary", 1.0, Some("solMass"), "Primary mass"),
            Parameter::float("mass@secondary", 1.0, Some("solMass"), "Secondary mass"),
            Parameter::float(
                "teff@primary",
                6000.0,
                Some("K"),
                "Primary effective temperature",
            ),
            Parameter::float(
                "teff@secondary",
                5800.0,
                Some("K"),
                "Secondary effective temperature",
            ),
            Parameter::float(
                "requiv@primary",
                1.0,
                Some("solRad"),
                "Primary equivalent radius",
            ),
            Parameter::float(
                "requiv@secondary",
                0.95,
                Some("solRad"),
                "Secondary equivalent radius",
            ),
        ];
        for param in params {
            bundle.parameters.insert(param.twig.clone(), param);
        }
        bundle
    }

    /// Resolve a twig to a parameter key. A query matches when every
    /// one of its `@`-segments appears in the parameter's twig; an
    /// exact twig always wins.
    fn resolve(&self, twig: &str) -> Result<String, BundleError> {
        if self.parameters.contains_key(twig) {
            return Ok(twig.to_string());
        }

        let query: Vec<&str> = twig.split('@').filter(|s| !s.is_empty()).collect();
        if query.is_empty() {
            return Err(BundleError::UnknownParameter(twig.to_string()));
        }

        let matches: Vec<String> = self
            .parameters
            .keys()
            .filter(|key| {
                let segments: Vec<&str> = key.split('@').collect();
                query.iter().all(|q| segments.contains(q))
            })
            .cloned()
            .collect();

        match matches.len() {
            0 => Err(BundleError::UnknownParameter(twig.to_string())),
            1 => Ok(matches.into_iter().next().unwrap_or_default()),
            _ => Err(BundleError::Ambiguous {
                twig: twig.to_string(),
                matches,
            }),
        }
    }

    pub fn get_parameter(&self, twig: &str) -> Result<&Parameter, BundleError> {
        let key = self.resolve(twig)?;
        self.parameters
            .get(&key)
            .ok_or_else(|| BundleError::UnknownParameter(twig.to_string()))
    }

    /// Value of a parameter, unit-wrapped when the parameter carries
    /// a unit.
    pub fn get_value(&self, twig: &str) -> Result<EngineValue, BundleError> {
        let param = self.get_parameter(twig)?;
        Ok(match &param.unit {
            Some(unit) => EngineValue::Quantity {
                value: Box::new(param.value.clone()),
                unit: unit.clone(),
            },
            None => param.value.clone(),
        })
    }

    /// Set a free parameter. Constrained parameters are read-only;
    /// flipping constraints is not a worker-side operation.
    pub fn set_value(&mut self, twig: &str, value: &Value) -> Result<(), BundleError> {
        let key = self.resolve(twig)?;
        let param = self
            .parameters
            .get_mut(&key)
            .ok_or_else(|| BundleError::UnknownParameter(twig.to_string()))?;
        if !param.constrained_by.is_empty() {
            return Err(BundleError::Constrained(key));
        }

        match EngineValue::from_json(value) {
            EngineValue::Quantity { value, unit } => {
                param.value = *value;
                param.unit = Some(unit);
            }
            plain => param.value = plain,
        }
        Ok(())
    }

    /// Attach a dataset, auto-naming it `{kind}{nn}` when no name is
    /// given. Also attaches the dataset's timing parameters.
    pub fn add_dataset(&mut self, kind: &str, name: Option<&str>) -> Result<String, BundleError> {
        let name = match name {
            Some(name) => {
                if self.datasets.contains_key(name) {
                    return Err(BundleError::DuplicateDataset(name.to_string()));
                }
                name.to_string()
            }
            None => self.next_dataset_name(kind),
        };

        self.datasets.insert(name.clone(), kind.to_string());

        for (qualifier, unit) in [("compute_times", Some("d")), ("compute_phases", None)] {
            let twig = format!("{qualifier}@{name}@dataset");
            let mut param = Parameter::float(&twig, 0.0, unit, "Dataset sampling");
            param.value = EngineValue::Array(Vec::new());
            self.parameters.insert(twig, param);
        }

        Ok(name)
    }

    fn next_dataset_name(&self, kind: &str) -> String {
        let mut n = 1;
        loop {
            let candidate = format!("{kind}{n:02}");
            if !self.datasets.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Detach a dataset and every parameter scoped to it.
    pub fn remove_dataset(&mut self, name: &str) -> Result<(), BundleError> {
        if self.datasets.remove(name).is_none() {
            return Err(BundleError::UnknownDataset(name.to_string()));
        }
        self.parameters
            .retain(|key, _| !key.split('@').any(|segment| segment == name));
        Ok(())
    }

    pub fn datasets(&self) -> &BTreeMap<String, String> {
        &self.datasets
    }

    /// Attach caller-defined parameters. Each spec carries `ptype`,
    /// `qualifier`, `value`, `description`, and optionally `choices`
    /// and `context` (defaulting to `ui`). Returns the new uniqueids.
    pub fn attach_parameters(&mut self, specs: &[Value]) -> Result<Vec<String>, BundleError> {
        let mut staged = Vec::with_capacity(specs.len());
        for spec in specs {
            staged.push(self.build_custom_parameter(spec)?);
        }

        let mut unique_ids = Vec::with_capacity(staged.len());
        for param in staged {
            unique_ids.push(param.uniqueid.clone());
            self.parameters.insert(param.twig.clone(), param);
        }
        Ok(unique_ids)
    }

    fn build_custom_parameter(&self, spec: &Value) -> Result<Parameter, BundleError> {
        let obj = spec
            .as_object()
            .ok_or_else(|| BundleError::InvalidBundle("parameter spec is not an object".into()))?;

        let ptype = obj
            .get("ptype")
            .and_then(Value::as_str)
            .ok_or_else(|| BundleError::InvalidBundle("parameter spec missing 'ptype'".into()))?;
        let kind = ParameterKind::from_ptype(ptype)
            .ok_or_else(|| BundleError::UnsupportedParameterType(ptype.to_string()))?;

        let qualifier = obj
            .get("qualifier")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BundleError::InvalidBundle("parameter spec missing 'qualifier'".into())
            })?;
        let context = obj.get("context").and_then(Value::as_str).unwrap_or("ui");
        let value = obj
            .get("value")
            .map(EngineValue::from_json)
            .unwrap_or(EngineValue::Raw(Value::Null));
        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let choices = obj
            .get("choices")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Parameter {
            twig: format!("{qualifier}@{context}"),
            qualifier: qualifier.to_string(),
            kind,
            value,
            unit: None,
            description: description.to_string(),
            choices,
            constrained_by: Vec::new(),
            uniqueid: new_uniqueid(),
        })
    }

    pub fn uniqueid_of(&self, twig: &str) -> Result<String, BundleError> {
        Ok(self.get_parameter(twig)?.uniqueid.clone())
    }

    pub fn find_by_uniqueid(&self, uniqueid: &str) -> Result<&Parameter, BundleError> {
        self.parameters
            .values()
            .find(|p| p.uniqueid == uniqueid)
            .ok_or_else(|| BundleError::UnknownUniqueId(uniqueid.to_string()))
    }

    pub fn is_constrained(&self, twig: &str) -> Result<bool, BundleError> {
        Ok(!self.get_parameter(twig)?.constrained_by.is_empty())
    }

    /// Full bundle dump, the payload of `save_bundle`.
    pub fn to_json(&self) -> Value {
        json!({
            "parameters": self.parameters.values().map(Parameter::to_json).collect::<Vec<_>>(),
            "datasets": self.datasets,
        })
    }

    /// Rebuild a bundle from a `save_bundle` dump.
    pub fn from_json(value: &Value) -> Result<Self, BundleError> {
        let obj = value
            .as_object()
            .ok_or_else(|| BundleError::InvalidBundle("bundle is not an object".into()))?;

        let mut bundle = Bundle::default();
        let params = obj
            .get("parameters")
            .and_then(Value::as_array)
            .ok_or_else(|| BundleError::InvalidBundle("bundle missing 'parameters'".into()))?;
        for param in params {
            let param = Parameter::from_json(param)?;
            bundle.parameters.insert(param.twig.clone(), param);
        }

        if let Some(datasets) = obj.get("datasets").and_then(Value::as_object) {
            for (name, kind) in datasets {
                let kind = kind.as_str().ok_or_else(|| {
                    BundleError::InvalidBundle(format!("dataset '{name}' kind is not a string"))
                })?;
                bundle.datasets.insert(name.clone(), kind.to_string());
            }
        }

        Ok(bundle)
    }

    #[cfg(test)]
    pub(crate) fn parameter_count(&self) -> usize {
        self.parameters.len()
    }
}

#[cfg(test)]
#[path = "bundle_tests.rs"]
mod tests;
