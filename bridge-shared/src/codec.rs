//! Typed variable codec: translates between the engine's `{value, type}`
//! envelope and native JSON values so handlers never see the envelope
//! themselves (§9 Design Notes, "Variable typing").

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    String,
    Boolean,
    Integer,
    Long,
    Double,
    Json,
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedVariable {
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: VariableType,
}

pub type VariableMap = HashMap<String, TypedVariable>;

/// Encodes a native JSON value into its `{value, type}` envelope.
/// Scalars map to their matching engine type; objects and arrays are
/// JSON-encoded as a string with `type = Json`.
pub fn encode_variable(value: &Value) -> TypedVariable {
    match value {
        Value::Null => TypedVariable {
            value: Value::Null,
            value_type: VariableType::Null,
        },
        Value::Bool(b) => TypedVariable {
            value: Value::Bool(*b),
            value_type: VariableType::Boolean,
        },
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let value_type = if i.unsigned_abs() <= i32::MAX as u64 {
                    VariableType::Integer
                } else {
                    VariableType::Long
                };
                TypedVariable {
                    value: Value::Number((*n).clone()),
                    value_type,
                }
            } else {
                TypedVariable {
                    value: Value::Number((*n).clone()),
                    value_type: VariableType::Double,
                }
            }
        }
        Value::String(s) => TypedVariable {
            value: Value::String(s.clone()),
            value_type: VariableType::String,
        },
        complex @ (Value::Array(_) | Value::Object(_)) => TypedVariable {
            value: Value::String(complex.to_string()),
            value_type: VariableType::Json,
        },
    }
}

/// Decodes a `{value, type}` envelope back into a native JSON value.
/// `Json`-typed values are parsed from their embedded string; a parse
/// failure yields the raw string rather than failing the whole decode.
pub fn decode_variable(var: &TypedVariable) -> Value {
    match var.value_type {
        VariableType::Json => match &var.value {
            Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
            other => other.clone(),
        },
        _ => var.value.clone(),
    }
}

pub fn encode_variables(map: &HashMap<String, Value>) -> VariableMap {
    map.iter()
        .map(|(k, v)| (k.clone(), encode_variable(v)))
        .collect()
}

pub fn decode_variables(map: &VariableMap) -> HashMap<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), decode_variable(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_scalars() {
        for value in [json!(true), json!(42), json!(3.5), json!("hello"), json!(null)] {
            let encoded = encode_variable(&value);
            assert_eq!(decode_variable(&encoded), value);
        }
    }

    #[test]
    fn complex_values_are_json_encoded() {
        let value = json!({"approved": true, "items": [1, 2, 3]});
        let encoded = encode_variable(&value);
        assert_eq!(encoded.value_type, VariableType::Json);
        assert!(matches!(encoded.value, Value::String(_)));
        assert_eq!(decode_variable(&encoded), value);
    }

    #[test]
    fn large_integers_encode_as_long() {
        let value = json!(9_000_000_000i64);
        let encoded = encode_variable(&value);
        assert_eq!(encoded.value_type, VariableType::Long);
    }
}
