//! Decoding of a single `OUTPUTS` cell.
//!
//! A cell holds the JSON array of transaction outputs for one transaction:
//!
//! ```text
//! [{"address": "1A1z...", "value": 5000000000, "script": "..."}, ...]
//! ```
//!
//! Only `address` and `value` survive; every other key is ignored.

use serde::de::Error as _;
use serde_json::Value;

/// Numeric amount of an output, kept in the narrowest type JSON gave us.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputValue {
    Int(i64),
    Float(f64),
}

impl OutputValue {
    fn from_number(n: &serde_json::Number) -> Option<Self> {
        match n.as_i64() {
            Some(v) => Some(OutputValue::Int(v)),
            None => n.as_f64().map(OutputValue::Float),
        }
    }

    fn from_text(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(v) = s.parse::<i64>() {
            return Some(OutputValue::Int(v));
        }
        s.parse::<f64>().ok().filter(|v| v.is_finite()).map(OutputValue::Float)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            OutputValue::Int(v) => v as f64,
            OutputValue::Float(v) => v,
        }
    }

    /// Integer view of the amount; `None` for fractional or out-of-range floats.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            OutputValue::Int(v) => Some(v),
            OutputValue::Float(v) => {
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                    Some(v as i64)
                } else {
                    None
                }
            }
        }
    }
}

/// One element of the outputs array after normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxOutput {
    pub address: Option<String>,
    pub value: Option<OutputValue>,
    /// `value` was present but not a JSON number: either a numeric string
    /// that was parsed, or something else that became null.
    pub value_coerced: bool,
}

impl TxOutput {
    fn from_json(element: &Value) -> Self {
        let Value::Object(map) = element else {
            return TxOutput::default();
        };

        let address = match map.get("address") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        let (value, value_coerced) = match map.get("value") {
            None | Some(Value::Null) => (None, false),
            Some(Value::Number(n)) => (OutputValue::from_number(n), false),
            Some(Value::String(s)) => (OutputValue::from_text(s), true),
            Some(_) => (None, true),
        };

        TxOutput {
            address,
            value,
            value_coerced,
        }
    }
}

/// Parses one `OUTPUTS` cell into its outputs.
///
/// `null` decodes to an empty list. Anything other than an array or `null`
/// is reported as a decode error so callers apply one malformed-input policy.
pub fn parse_outputs(text: &str) -> Result<Vec<TxOutput>, serde_json::Error> {
    match serde_json::from_str::<Value>(text)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(elements) => Ok(elements.iter().map(TxOutput::from_json).collect()),
        other => Err(serde_json::Error::custom(format!(
            "expected a JSON array of outputs, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
