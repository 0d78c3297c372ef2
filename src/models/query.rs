//! Query-related data models.
//!
//! This module defines parameter values, result envelopes and the
//! statement pair produced by the builders.

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A row as returned to callers: column name to JSON value.
pub type JsonRow = serde_json::Map<String, JsonValue>;

/// A scalar parameter value for parameterized statements.
///
/// The set of variants is closed; anything else is rejected when converting
/// from JSON (see [`ParamValue::from_json`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ParamValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl ParamValue {
    /// Convert an arbitrary JSON value into a parameter value.
    ///
    /// Integer-valued numbers (including `7.0`) become [`ParamValue::Int`],
    /// other numbers [`ParamValue::Float`]. Arrays and objects are rejected.
    pub fn from_json(name: &str, value: JsonValue) -> DbResult<Self> {
        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(b) => Ok(Self::Bool(b)),
            JsonValue::String(s) => Ok(Self::String(s)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Self::Int(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Ok(Self::Int(f as i64))
                    }
                    Some(f) => Ok(Self::Float(f)),
                    None => Err(DbError::invalid_input(format!(
                        "Parameter '{}' is not a representable number",
                        name
                    ))),
                }
            }
            JsonValue::Array(_) | JsonValue::Object(_) => Err(DbError::invalid_input(format!(
                "Parameter '{}' must be a string, number, boolean or null",
                name
            ))),
        }
    }
}

impl TryFrom<JsonValue> for ParamValue {
    type Error = DbError;

    fn try_from(value: JsonValue) -> DbResult<Self> {
        Self::from_json("value", value)
    }
}

/// Named parameters for a statement. Names carry no leading `@`.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Convert a JSON object into a [`ParamMap`], rejecting non-scalar values.
pub fn param_map_from_json(object: serde_json::Map<String, JsonValue>) -> DbResult<ParamMap> {
    object
        .into_iter()
        .map(|(name, value)| {
            let name = name.trim_start_matches('@').to_string();
            let value = ParamValue::from_json(&name, value)?;
            Ok((name, value))
        })
        .collect()
}

/// Name and engine type of a result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldInfo {
    pub name: String,
    /// Engine-reported type, e.g. "Int4", "NVarchar", "Datetime2"
    #[serde(rename = "type")]
    pub type_name: String,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Result of a read through the execution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Rows, truncated to the caller's limit
    pub rows: Vec<JsonRow>,
    /// Untruncated row count reported by the driver
    pub row_count_total: usize,
    pub fields: Vec<FieldInfo>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// True when rows were dropped to honour the row limit.
    pub fn is_truncated(&self) -> bool {
        self.row_count_total > self.rows.len()
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value of the first field of the first row, in result-field order.
    pub fn first_value(&self) -> Option<&JsonValue> {
        let row = self.rows.first()?;
        match self.fields.first() {
            Some(field) => row.get(&field.name),
            None => row.values().next(),
        }
    }
}

/// Result of a write through the execution pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct WriteResult {
    pub affected_rows: u64,
    pub duration_ms: u64,
}

/// SQL text paired with its named parameters, as produced by the builders.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: ParamMap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(ParamValue::from_json("a", json!(7)).unwrap(), ParamValue::Int(7));
        assert_eq!(ParamValue::from_json("a", json!(7.0)).unwrap(), ParamValue::Int(7));
        assert_eq!(
            ParamValue::from_json("a", json!(2.5)).unwrap(),
            ParamValue::Float(2.5)
        );
        assert_eq!(
            ParamValue::from_json("a", json!(9007199254740993_i64)).unwrap(),
            ParamValue::Int(9007199254740993)
        );
    }

    #[test]
    fn test_from_json_rejects_composites() {
        assert!(ParamValue::from_json("a", json!([1, 2])).is_err());
        let err = ParamValue::from_json("filter", json!({"x": 1})).unwrap_err();
        assert!(err.to_string().contains("filter"));
    }

    #[test]
    fn test_param_map_strips_marker() {
        let object = json!({"@id": 7, "name": "x"});
        let map = param_map_from_json(object.as_object().unwrap().clone()).unwrap();
        assert_eq!(map.get("id"), Some(&ParamValue::Int(7)));
        assert_eq!(map.get("name"), Some(&ParamValue::String("x".into())));
    }

    #[test]
    fn test_execution_result_truncation() {
        let result = ExecutionResult {
            rows: vec![JsonRow::new()],
            row_count_total: 3,
            fields: Vec::new(),
            duration_ms: 1,
        };
        assert!(result.is_truncated());
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn test_first_value_follows_field_order() {
        let mut row = JsonRow::new();
        row.insert("a".into(), json!(1));
        row.insert("z".into(), json!(2));
        let result = ExecutionResult {
            rows: vec![row],
            row_count_total: 1,
            fields: vec![FieldInfo::new("z", "Int4"), FieldInfo::new("a", "Int4")],
            duration_ms: 0,
        };
        assert_eq!(result.first_value(), Some(&json!(2)));
    }
}
