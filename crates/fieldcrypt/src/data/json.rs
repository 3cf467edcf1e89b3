//! Conversions between schemaless JSON values and the typed [`Value`] model.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Number};

use super::{DataError, Value};

impl Value {
    /// Convert a JSON value into the typed model.
    ///
    /// Integers become `INT64`, other numbers `FLOAT64`, objects become string-keyed
    /// maps in their iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnsupportedType`] for unsigned integers above `i64::MAX`,
    /// which have no lossless typed counterpart.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, DataError> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => number_to_value(n)?,
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| Ok((Value::String(k.clone()), Value::from_json(v)?)))
                    .collect::<Result<_, DataError>>()?,
            ),
        })
    }

    /// Render this value as JSON.
    ///
    /// Bytes become standard base64 strings, structs and maps become objects keyed
    /// by the display form of their keys. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int8(n) => (*n).into(),
            Value::Int16(n) => (*n).into(),
            Value::Int32(n) => (*n).into(),
            Value::Int64(n) => (*n).into(),
            Value::Float32(n) => float_to_json(f64::from(*n)),
            Value::Float64(n) => float_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Value::Struct(s) => serde_json::Value::Object(
                s.fields()
                    .map(|(f, v)| (f.name.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

fn number_to_value(n: &Number) -> Result<Value, DataError> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Int64(i))
    } else if n.is_u64() {
        Err(DataError::UnsupportedType(format!(
            "unsigned integer {n} exceeds INT64 range"
        )))
    } else {
        n.as_f64()
            .map(Value::Float64)
            .ok_or_else(|| DataError::UnsupportedType(format!("number {n}")))
    }
}

fn float_to_json(n: f64) -> serde_json::Value {
    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
