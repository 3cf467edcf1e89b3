//! Typed value <-> byte conversion feeding the cipher engine.
//!
//! # Encoding
//!
//! ```text
//! <format version: 1 byte> <bincode(Value)>
//! ```
//!
//! The bincode encoding carries the [`Value`] variant tag, so every primitive width
//! comes back as exactly the kind it was written as. A [`Value::Struct`] serialises
//! its whole schema (names, order, nested types) ahead of its values, which is what
//! lets an OBJECT-mode subtree be rebuilt as a structurally identical record.

use thiserror::Error;

use crate::data::Value;

/// Leading byte of every serialised value.
pub const FORMAT_VERSION: u8 = 1;

/// Errors produced by a [`SerdeProcessor`].
#[derive(Debug, Error)]
pub enum SerdeError {
    /// The value could not be encoded.
    #[error("failed to serialise value: {0}")]
    Encode(String),

    /// The bytes are not a valid encoding produced by this processor.
    #[error("failed to deserialise value: {0}")]
    Decode(String),
}

/// Converts typed values to bytes and back without losing type information.
pub trait SerdeProcessor: Send + Sync {
    /// Serialise `value` into a self-describing byte sequence.
    fn object_to_bytes(&self, value: &Value) -> Result<Vec<u8>, SerdeError>;

    /// Reconstruct the value previously written by [`SerdeProcessor::object_to_bytes`].
    fn bytes_to_object(&self, bytes: &[u8]) -> Result<Value, SerdeError>;
}

/// [`SerdeProcessor`] backed by bincode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerdeProcessor;

impl SerdeProcessor for BincodeSerdeProcessor {
    fn object_to_bytes(&self, value: &Value) -> Result<Vec<u8>, SerdeError> {
        let encoded = bincode::serialize(value).map_err(|e| SerdeError::Encode(e.to_string()))?;
        let mut out = Vec::with_capacity(encoded.len() + 1);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&encoded);
        Ok(out)
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<Value, SerdeError> {
        match bytes.split_first() {
            Some((&FORMAT_VERSION, body)) => {
                bincode::deserialize(body).map_err(|e| SerdeError::Decode(e.to_string()))
            }
            Some((other, _)) => Err(SerdeError::Decode(format!(
                "unknown format version {other}"
            ))),
            None => Err(SerdeError::Decode("empty input".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::{Schema, Struct, Type};

    fn round_trip(value: Value) -> Value {
        let serde = BincodeSerdeProcessor;
        serde
            .bytes_to_object(&serde.object_to_bytes(&value).unwrap())
            .unwrap()
    }

    #[test]
    fn primitive_widths_are_preserved() {
        for value in [
            Value::Int8(-3),
            Value::Int16(300),
            Value::Int32(70_000),
            Value::Int64(1 << 40),
            Value::Float32(1.25),
            Value::Float64(2.5),
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn null_small_and_large_strings() {
        let large = "a".repeat(100_000);
        assert_eq!(round_trip(Value::Null), Value::Null);
        assert_eq!(round_trip(Value::from("test")), Value::from("test"));
        assert_eq!(round_trip(Value::String(large.clone())), Value::String(large));
    }

    #[test]
    fn struct_carries_its_schema() {
        let inner = Schema::structure()
            .named("Address")
            .with_field("city", Schema::string())
            .with_field("zip", Schema::of(Type::Int32).optional());
        let schema = Arc::new(
            Schema::structure()
                .named("Person")
                .with_field("name", Schema::string())
                .with_field("address", inner.clone()),
        );
        let address = Struct::new(Arc::new(inner))
            .unwrap()
            .with("city", Value::from("Graz"))
            .unwrap()
            .with("zip", Value::Int32(8010))
            .unwrap();
        let person = Struct::new(schema)
            .unwrap()
            .with("name", Value::from("Bob"))
            .unwrap()
            .with("address", Value::Struct(address))
            .unwrap();

        let restored = round_trip(Value::Struct(person.clone()));
        let Value::Struct(restored) = restored else {
            panic!("expected a struct");
        };
        assert_eq!(restored.schema().name.as_deref(), Some("Person"));
        assert_eq!(restored, person);
    }

    #[test]
    fn unknown_format_version_rejected() {
        let serde = BincodeSerdeProcessor;
        let mut bytes = serde.object_to_bytes(&Value::Boolean(true)).unwrap();
        bytes[0] = 9;
        assert!(serde.bytes_to_object(&bytes).is_err());
        assert!(serde.bytes_to_object(&[]).is_err());
    }

    #[test]
    fn truncated_input_rejected() {
        let serde = BincodeSerdeProcessor;
        let bytes = serde.object_to_bytes(&Value::from("hello world")).unwrap();
        assert!(serde.bytes_to_object(&bytes[..4]).is_err());
    }
}
