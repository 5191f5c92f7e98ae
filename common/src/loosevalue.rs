use schemars::{
    JsonSchema,
    r#gen::SchemaGenerator,
    schema::{Schema, SchemaObject},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A spec field that users write either as a number or as a string
///
/// YAML authors routinely quote numbers (`replicas: "2"`) or leave fields empty, so these fields
/// are kept as received and coerced where they are used.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(untagged)]
pub enum LooseValue {
    #[default]
    Absent,
    Int(i64),
    Bool(bool),
    String(String),
    Other(serde_json::Value),
}

impl JsonSchema for LooseValue {
    fn schema_name() -> String {
        "LooseValue".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        let mut obj = SchemaObject::default();
        obj.extensions
            .insert("x-kubernetes-preserve-unknown-fields".to_string(), serde_json::Value::Bool(true));
        obj.extensions.insert("nullable".to_string(), serde_json::Value::Bool(true));
        Schema::Object(obj)
    }
}

impl LooseValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, LooseValue::Absent)
    }

    /// Integer reading: integers as is, strings parsed, anything else is `None`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LooseValue::Int(i) => Some(*i),
            LooseValue::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Textual reading used for resource quantities
    pub fn as_text(&self) -> Option<String> {
        match self {
            LooseValue::Absent => None,
            LooseValue::Int(i) => Some(i.to_string()),
            LooseValue::Bool(_) => None,
            LooseValue::String(s) if s.is_empty() || s == "null" => None,
            LooseValue::String(s) => Some(s.clone()),
            LooseValue::Other(serde_json::Value::Number(n)) => Some(n.to_string()),
            LooseValue::Other(_) => None,
        }
    }
}

/// Replica count: integers and numeric strings are taken as is except zero; zero, absent,
/// empty, booleans and garbage fall back to `default`
pub fn replicas(value: &LooseValue, default: i32) -> i32 {
    match value.as_i64().and_then(|v| i32::try_from(v).ok()) {
        Some(v) if v != 0 => v,
        Some(_) | None => {
            if !value.is_absent() {
                warn!("Not supported value for replicas {value:?}. Using default value {default}");
            }
            default
        }
    }
}

/// Envoy worker concurrency: positive integers are taken, otherwise `default`
pub fn concurrency(value: &LooseValue, default: i32) -> i32 {
    match value.as_i64().and_then(|v| i32::try_from(v).ok()) {
        Some(v) if v > 0 => v,
        _ => default,
    }
}

/// HPA numeric fields: any integer or numeric string, otherwise `default` with a warning
pub fn hpa_int32(value: &LooseValue, default: i32, field: &str) -> i32 {
    match value.as_i64().and_then(|v| i32::try_from(v).ok()) {
        Some(v) => v,
        None => {
            if !value.is_absent() {
                warn!("Can not parse '{field}' with value '{value:?}' from HPA config. Will be used default value '{default}'.");
            }
            default
        }
    }
}
