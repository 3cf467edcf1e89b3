//! [`Node`] for typed values; the shape of a node is its output schema.

use std::sync::Arc;

use super::{Children, Node};
use crate::data::{DataError, Schema, Struct, Type, Value};

impl Node for Value {
    type Shape = Arc<Schema>;

    fn children(&self) -> Children<'_, Self> {
        match self {
            Value::Array(items) => Children::List(items),
            Value::Map(entries) => Children::Map(entries.iter().map(|(k, v)| (k.to_string(), v)).collect()),
            Value::Struct(s) => Children::Record(s.fields().map(|(f, v)| (f.name.clone(), v)).collect()),
            _ => Children::Leaf,
        }
    }

    fn type_tag(&self) -> &'static str {
        Value::type_tag(self)
    }

    fn to_value(&self) -> Result<Value, DataError> {
        Ok(self.clone())
    }

    fn from_value(value: Value, shape: &Arc<Schema>) -> Result<Self, DataError> {
        value.conform(shape)
    }

    fn envelope(text: String) -> Self {
        Value::String(text)
    }

    fn as_envelope(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn child_shape(shape: &Arc<Schema>, key: Option<&str>) -> Result<Arc<Schema>, DataError> {
        let child = match (shape.ty, key) {
            (Type::Struct, Some(name)) => {
                return shape
                    .field(name)
                    .map(|f| f.schema.clone())
                    .ok_or_else(|| DataError::UnknownField(name.to_owned()))
            }
            (Type::Array | Type::Map, _) => shape.value_schema.clone(),
            _ => None,
        };
        child.ok_or_else(|| DataError::UnsupportedType(format!("{} schema has no element schema", shape.ty)))
    }

    fn rebuild_list(&self, items: Vec<Self>, _shape: &Arc<Schema>) -> Result<Self, DataError> {
        Ok(Value::Array(items))
    }

    fn rebuild_entries(&self, entries: Vec<(String, Self)>, shape: &Arc<Schema>) -> Result<Self, DataError> {
        match self {
            // Path keys are display strings; the original keys are restored by position.
            Value::Map(original) => Ok(Value::Map(
                original
                    .iter()
                    .zip(entries)
                    .map(|((key, _), (_, value))| (key.clone(), value))
                    .collect(),
            )),
            Value::Struct(_) => {
                let values = entries.into_iter().map(|(_, v)| v).collect();
                Ok(Value::Struct(Struct::from_values(shape.clone(), values)?))
            }
            other => Err(DataError::UnsupportedType(format!(
                "cannot rebuild entries of {}",
                other.type_tag()
            ))),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{cipher, is_envelope};
    use super::super::{ProcessError, RecordHandler, TransformError};
    use super::*;
    use crate::schema::SchemaAdapter;
    use crate::serdes::BincodeSerdeProcessor;
    use crate::settings::{CipherMode, FieldConfig, FieldMode, TransformSettings};

    fn run(settings: &TransformSettings, record: &Struct) -> Result<Struct, TransformError> {
        let cipher = cipher();
        let output = Arc::new(SchemaAdapter::new(settings).adapt(record.schema())?);
        match RecordHandler::new(settings, &cipher, &BincodeSerdeProcessor).match_fields(
            &Value::Struct(record.clone()),
            &output,
            "",
        )? {
            Value::Struct(s) => Ok(s),
            other => panic!("expected a struct, got {other:?}"),
        }
    }

    fn settings(mode: CipherMode, field_mode: FieldMode, fields: Vec<FieldConfig>) -> TransformSettings {
        TransformSettings::new(mode, fields, "k1", "v1")
            .unwrap()
            .with_field_mode(field_mode)
    }

    fn widths_schema() -> Arc<Schema> {
        Arc::new(
            Schema::structure()
                .named("Widths")
                .with_field("b", Schema::of(Type::Boolean))
                .with_field("i8", Schema::of(Type::Int8))
                .with_field("i16", Schema::of(Type::Int16))
                .with_field("i32", Schema::of(Type::Int32))
                .with_field("i64", Schema::of(Type::Int64))
                .with_field("f32", Schema::of(Type::Float32))
                .with_field("f64", Schema::of(Type::Float64))
                .with_field("bytes", Schema::of(Type::Bytes))
                .with_field("note", Schema::string().optional()),
        )
    }

    fn widths_record() -> Struct {
        Struct::new(widths_schema())
            .and_then(|s| s.with("b", Value::Boolean(true)))
            .and_then(|s| s.with("i8", Value::Int8(-8)))
            .and_then(|s| s.with("i16", Value::Int16(1600)))
            .and_then(|s| s.with("i32", Value::Int32(-320_000)))
            .and_then(|s| s.with("i64", Value::Int64(i64::MAX)))
            .and_then(|s| s.with("f32", Value::Float32(3.25)))
            .and_then(|s| s.with("f64", Value::Float64(-0.125)))
            .and_then(|s| s.with("bytes", Value::Bytes(vec![0, 1, 255])))
            .unwrap()
    }

    #[test]
    fn every_width_round_trips() {
        let names = ["b", "i8", "i16", "i32", "i64", "f32", "f64", "bytes", "note"];
        let enc_fields: Vec<_> = names.iter().map(|n| FieldConfig::new(*n)).collect();
        let dec_fields: Vec<_> = names
            .iter()
            .map(|n| {
                let declared = widths_schema().field(n).unwrap().schema.as_ref().clone();
                FieldConfig::new(*n).with_schema(declared)
            })
            .collect();

        let record = widths_record();
        let encrypted = run(&settings(CipherMode::Encrypt, FieldMode::Element, enc_fields), &record).unwrap();
        for (field, value) in encrypted.fields() {
            assert_eq!(field.schema.ty, Type::String, "{}", field.name);
            match value {
                Value::String(s) => assert!(is_envelope(s, "v1")),
                Value::Null => assert_eq!(field.name, "note"),
                other => panic!("{} not encrypted: {other:?}", field.name),
            }
        }

        let decrypted = run(&settings(CipherMode::Decrypt, FieldMode::Element, dec_fields), &encrypted).unwrap();
        let values: Vec<_> = decrypted.fields().map(|(_, v)| v.clone()).collect();
        let expected: Vec<_> = record.fields().map(|(_, v)| v.clone()).collect();
        assert_eq!(values, expected);
        assert_eq!(decrypted.get("i64"), Some(&Value::Int64(i64::MAX)));
        assert_eq!(decrypted.schema().field("i16").unwrap().schema.ty, Type::Int16);
    }

    fn nested_schema() -> Arc<Schema> {
        Arc::new(
            Schema::structure()
                .with_field("id", Schema::of(Type::Int32))
                .with_field("tags", Schema::array(Schema::string()))
                .with_field("scores", Schema::map(Schema::string(), Schema::of(Type::Int64)))
                .with_field(
                    "contact",
                    Schema::structure()
                        .with_field("email", Schema::string())
                        .with_field("zip", Schema::of(Type::Int32)),
                ),
        )
    }

    fn nested_record() -> Struct {
        let schema = nested_schema();
        let contact = Struct::new(schema.field("contact").unwrap().schema.clone())
            .and_then(|c| c.with("email", Value::from("a@b.c")))
            .and_then(|c| c.with("zip", Value::Int32(1010)))
            .unwrap();
        Struct::new(schema)
            .and_then(|s| s.with("id", Value::Int32(1)))
            .and_then(|s| s.with("tags", Value::Array(vec!["x".into(), "y".into()])))
            .and_then(|s| {
                s.with(
                    "scores",
                    Value::Map(vec![(Value::from("math"), Value::Int64(90)), (Value::from("art"), Value::Int64(75))]),
                )
            })
            .and_then(|s| s.with("contact", Value::Struct(contact)))
            .unwrap()
    }

    #[test]
    fn element_mode_list_gives_one_envelope_per_item() {
        let s = settings(CipherMode::Encrypt, FieldMode::Element, vec![FieldConfig::new("tags")]);
        let out = run(&s, &nested_record()).unwrap();
        let Some(Value::Array(items)) = out.get("tags") else {
            panic!("tags is not an array");
        };
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|v| matches!(v, Value::String(s) if is_envelope(s, "v1"))));
    }

    #[test]
    fn object_mode_list_gives_single_envelope() {
        let s = settings(CipherMode::Encrypt, FieldMode::Object, vec![FieldConfig::new("tags")]);
        let out = run(&s, &nested_record()).unwrap();
        assert!(matches!(out.get("tags"), Some(Value::String(s)) if is_envelope(s, "v1")));
        assert_eq!(out.schema().field("tags").unwrap().schema.ty, Type::String);
    }

    #[test]
    fn object_mode_struct_round_trips() {
        let declared = nested_schema().field("contact").unwrap().schema.as_ref().clone();
        let enc = settings(CipherMode::Encrypt, FieldMode::Object, vec![FieldConfig::new("contact")]);
        let dec = settings(
            CipherMode::Decrypt,
            FieldMode::Object,
            vec![FieldConfig::new("contact").with_schema(declared)],
        );
        let record = nested_record();
        let encrypted = run(&enc, &record).unwrap();
        assert!(matches!(encrypted.get("contact"), Some(Value::String(_))));
        let decrypted = run(&dec, &encrypted).unwrap();
        assert_eq!(decrypted.get("contact"), record.get("contact"));
    }

    #[test]
    fn object_mode_override_is_matched_by_field_name() {
        let enc = settings(CipherMode::Encrypt, FieldMode::Object, vec![FieldConfig::new("contact")]);
        let encrypted = run(&enc, &nested_record()).unwrap();

        let reordered = Schema::structure()
            .with_field("zip", Schema::of(Type::Int32))
            .with_field("email", Schema::string());
        let dec = settings(
            CipherMode::Decrypt,
            FieldMode::Object,
            vec![FieldConfig::new("contact").with_schema(reordered)],
        );
        let decrypted = run(&dec, &encrypted).unwrap();
        let Some(Value::Struct(contact)) = decrypted.get("contact") else {
            panic!("contact is not a struct");
        };
        assert_eq!(contact.get("zip"), Some(&Value::Int32(1010)));
        assert_eq!(contact.get("email"), Some(&Value::from("a@b.c")));
        let names: Vec<_> = contact.fields().map(|(f, _)| f.name.as_str()).collect();
        assert_eq!(names, ["zip", "email"]);
    }

    #[test]
    fn object_mode_override_with_wrong_member_type_fails() {
        let enc = settings(CipherMode::Encrypt, FieldMode::Object, vec![FieldConfig::new("contact")]);
        let encrypted = run(&enc, &nested_record()).unwrap();

        let swapped = Schema::structure()
            .with_field("email", Schema::of(Type::Int32))
            .with_field("zip", Schema::string());
        let dec = settings(
            CipherMode::Decrypt,
            FieldMode::Object,
            vec![FieldConfig::new("contact").with_schema(swapped)],
        );
        let err = run(&dec, &encrypted).unwrap_err();
        assert!(matches!(
            err,
            TransformError::Field {
                source: ProcessError::Data(DataError::TypeMismatch { expected: Type::Int32, found: "STRING" }),
                ..
            }
        ));
    }

    #[test]
    fn object_mode_list_elements_are_checked() {
        let enc = settings(CipherMode::Encrypt, FieldMode::Object, vec![FieldConfig::new("tags")]);
        let encrypted = run(&enc, &nested_record()).unwrap();
        let dec = settings(
            CipherMode::Decrypt,
            FieldMode::Object,
            vec![FieldConfig::new("tags").with_schema(Schema::array(Schema::of(Type::Int64)))],
        );
        let err = run(&dec, &encrypted).unwrap_err();
        assert!(matches!(
            err,
            TransformError::Field {
                source: ProcessError::Data(DataError::TypeMismatch { expected: Type::Int64, found: "STRING" }),
                ..
            }
        ));
    }

    #[test]
    fn map_keys_survive_element_mode() {
        let s = settings(CipherMode::Encrypt, FieldMode::Element, vec![FieldConfig::new("scores")]);
        let out = run(&s, &nested_record()).unwrap();
        let Some(Value::Map(entries)) = out.get("scores") else {
            panic!("scores is not a map");
        };
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, [Value::from("math"), Value::from("art")]);
        assert!(entries.iter().all(|(_, v)| matches!(v, Value::String(_))));
    }

    #[test]
    fn unconfigured_fields_untouched() {
        let s = settings(CipherMode::Encrypt, FieldMode::Element, vec![FieldConfig::new("contact.email")]);
        let record = nested_record();
        let out = run(&s, &record).unwrap();
        assert_eq!(out.get("id"), record.get("id"));
        assert_eq!(out.get("tags"), record.get("tags"));
        assert_eq!(out.get("scores"), record.get("scores"));
        let Some(Value::Struct(contact)) = out.get("contact") else {
            panic!("contact is not a struct");
        };
        assert!(matches!(contact.get("email"), Some(Value::String(s)) if is_envelope(s, "v1")));
        assert_eq!(contact.get("zip"), Some(&Value::Int32(1010)));
    }

    #[test]
    fn decrypted_kind_must_match_declared_kind() {
        let enc = settings(CipherMode::Encrypt, FieldMode::Element, vec![FieldConfig::new("id")]);
        let encrypted = run(&enc, &nested_record()).unwrap();
        let dec = settings(
            CipherMode::Decrypt,
            FieldMode::Element,
            vec![FieldConfig::new("id").with_schema(Schema::of(Type::Int64))],
        );
        let err = run(&dec, &encrypted).unwrap_err();
        assert!(matches!(
            err,
            TransformError::Field {
                source: ProcessError::Data(DataError::TypeMismatch { expected: Type::Int64, found: "INT32" }),
                ..
            }
        ));
    }
}
