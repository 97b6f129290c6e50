//! Typed values carried along workflow edges.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A value of one of the closed set of wire types.
///
/// Node-specific payloads are deliberately opaque (`Json`); the engine only
/// distinguishes the outer tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DataValue {
    /// UTF-8 text.
    String(String),
    /// Double-precision number.
    Number(f64),
    /// Boolean flag.
    Boolean(bool),
    /// Arbitrary JSON payload.
    Json(serde_json::Value),
}

impl DataValue {
    /// Returns the string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric content, if this is a number value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Converts the value into plain JSON, dropping the tag.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            DataValue::String(s) => serde_json::Value::String(s),
            DataValue::Number(n) => serde_json::json!(n),
            DataValue::Boolean(b) => serde_json::Value::Bool(b),
            DataValue::Json(v) => v,
        }
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::String(value.to_owned())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::String(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Number(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Boolean(value)
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        DataValue::Json(value)
    }
}

/// A named, typed value on a node's input or output list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    /// Optional stable identifier, used to address a specific input slot
    /// (external input resumption matches on this).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Display name of the value.
    pub name: String,
    /// The tagged payload.
    #[serde(flatten)]
    pub value: DataValue,
}

impl TypedValue {
    /// Creates a new typed value.
    pub fn new(name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self {
            id: None,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Attaches a stable identifier to this value.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}
