//! Output schemas for schema-carrying records.
//!
//! # Responsibilities
//!
//! - Derive, from the schema of an input `STRUCT`, the schema the transformed record
//!   will have. Structure is mirrored; only configured fields change type.
//! - Cache derived schemas by identity of the input `Arc<Schema>` ([`SchemaCache`]).
//!
//! # Rules
//!
//! | cipher mode | field mode | configured field becomes |
//! |-------------|------------|--------------------------|
//! | ENCRYPT | OBJECT | `STRING` |
//! | ENCRYPT | ELEMENT | same shape, every primitive mapped through [`mapping::ENCRYPT_TYPES`] |
//! | DECRYPT | OBJECT | its `FieldConfig.schema` override |
//! | DECRYPT | ELEMENT | the override, every primitive mapped through [`mapping::DECRYPT_TYPES`] |
//!
//! Map keys are never mapped. Optionality of the configured field is kept.
//! Unconfigured `STRUCT` fields are descended into; other unconfigured fields are
//! shared with the input schema.

pub mod cache;
pub mod mapping;

pub use cache::SchemaCache;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::data::{Field, Schema, Type};
use crate::settings::{CipherMode, ConfigurationError, FieldMode, TransformSettings};

/// Errors from schema derivation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    /// The type tables have no row for this kind.
    #[error("unsupported type: {0}")]
    UnsupportedType(Type),

    /// Only `STRUCT` records can be adapted.
    #[error("record schema must be STRUCT, found {0}")]
    NotAStruct(Type),

    /// A container schema without its element schema.
    #[error("{ty} schema has no {part}")]
    Incomplete { ty: Type, part: &'static str },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Derives output schemas according to one set of [`TransformSettings`].
#[derive(Debug, Clone, Copy)]
pub struct SchemaAdapter<'a> {
    settings: &'a TransformSettings,
}

impl<'a> SchemaAdapter<'a> {
    pub fn new(settings: &'a TransformSettings) -> Self {
        Self { settings }
    }

    /// Output schema of a record whose schema is `input`.
    ///
    /// # Errors
    ///
    /// Fails if `input` is not a `STRUCT`, a configured field holds a kind the type
    /// tables do not cover, or a field lacks the schema override decryption needs.
    pub fn adapt(&self, input: &Schema) -> Result<Schema, SchemaError> {
        if input.ty != Type::Struct {
            return Err(SchemaError::NotAStruct(input.ty));
        }
        let output = self.adapt_struct(input, "")?;
        debug!(schema = ?input.name, mode = %self.settings.cipher_mode, "derived output schema");
        Ok(output)
    }

    fn adapt_struct(&self, schema: &Schema, path: &str) -> Result<Schema, SchemaError> {
        let fields = schema
            .fields
            .iter()
            .map(|field| {
                let field_path = self.settings.join_path(path, &field.name);
                let adapted = if self.settings.field(&field_path).is_some() {
                    Arc::new(self.adapt_configured(&field.schema, &field_path)?)
                } else if field.schema.ty == Type::Struct {
                    Arc::new(self.adapt_struct(&field.schema, &field_path)?)
                } else {
                    field.schema.clone()
                };
                Ok(Field {
                    name: field.name.clone(),
                    schema: adapted,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        Ok(Schema {
            fields,
            ..schema.clone()
        })
    }

    fn adapt_configured(&self, schema: &Schema, path: &str) -> Result<Schema, SchemaError> {
        let adapted = match (self.settings.cipher_mode, self.settings.field_mode) {
            (CipherMode::Encrypt, FieldMode::Object) => schema.retyped(Type::String),
            (CipherMode::Encrypt, FieldMode::Element) => mirror(schema, mapping::ENCRYPT_TYPES)?,
            (CipherMode::Decrypt, field_mode) => {
                let declared = self
                    .settings
                    .field(path)
                    .and_then(|f| f.schema.as_ref())
                    .ok_or_else(|| {
                        ConfigurationError(format!(
                            "field '{path}' has no schema override; one is required to decrypt schema-carrying records"
                        ))
                    })?;
                match field_mode {
                    FieldMode::Object => declared.clone(),
                    FieldMode::Element => mirror(declared, mapping::DECRYPT_TYPES)?,
                }
            }
        };
        Ok(Schema {
            optional: schema.optional,
            ..adapted
        })
    }
}

/// Same structure as `schema` with every primitive mapped through `table`.
fn mirror(schema: &Schema, table: &[(Type, Type)]) -> Result<Schema, SchemaError> {
    match schema.ty {
        ty if ty.is_primitive() => {
            let mapped = mapping::lookup(table, ty).ok_or(SchemaError::UnsupportedType(ty))?;
            Ok(schema.retyped(mapped))
        }
        Type::Array | Type::Map => Ok(Schema {
            value_schema: Some(Arc::new(mirror(value_schema(schema)?, table)?)),
            ..schema.clone()
        }),
        _ => {
            let fields = schema
                .fields
                .iter()
                .map(|f| {
                    Ok(Field {
                        name: f.name.clone(),
                        schema: Arc::new(mirror(&f.schema, table)?),
                    })
                })
                .collect::<Result<Vec<_>, SchemaError>>()?;
            Ok(Schema {
                fields,
                ..schema.clone()
            })
        }
    }
}

fn value_schema(schema: &Schema) -> Result<&Schema, SchemaError> {
    schema.value_schema.as_deref().ok_or(SchemaError::Incomplete {
        ty: schema.ty,
        part: "valueSchema",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::FieldConfig;

    fn person() -> Schema {
        Schema::structure()
            .named("Person")
            .with_field("name", Schema::string())
            .with_field("age", Schema::of(Type::Int32).optional())
            .with_field("tags", Schema::array(Schema::string()))
            .with_field("scores", Schema::map(Schema::string(), Schema::of(Type::Int64)))
            .with_field(
                "contact",
                Schema::structure()
                    .with_field("email", Schema::string())
                    .with_field("zip", Schema::of(Type::Int16)),
            )
    }

    fn settings(mode: CipherMode, field_mode: FieldMode, fields: Vec<FieldConfig>) -> TransformSettings {
        TransformSettings::new(mode, fields, "k1", "v1")
            .unwrap()
            .with_field_mode(field_mode)
    }

    fn field_type(schema: &Schema, path: &[&str]) -> Type {
        let mut current = schema;
        for name in path {
            current = &*current.field(name).unwrap().schema;
        }
        current.ty
    }

    #[test]
    fn encrypt_object_mode_turns_field_into_optional_string() {
        let s = settings(
            CipherMode::Encrypt,
            FieldMode::Object,
            vec![FieldConfig::new("age"), FieldConfig::new("tags")],
        );
        let out = SchemaAdapter::new(&s).adapt(&person()).unwrap();
        let age = &out.field("age").unwrap().schema;
        assert_eq!(age.ty, Type::String);
        assert!(age.optional);
        assert_eq!(field_type(&out, &["tags"]), Type::String);
        assert_eq!(field_type(&out, &["name"]), Type::String);
        assert_eq!(out.name.as_deref(), Some("Person"));
    }

    #[test]
    fn encrypt_element_mode_keeps_containers() {
        let s = settings(
            CipherMode::Encrypt,
            FieldMode::Element,
            vec![FieldConfig::new("scores"), FieldConfig::new("contact.zip")],
        );
        let out = SchemaAdapter::new(&s).adapt(&person()).unwrap();
        let scores = &out.field("scores").unwrap().schema;
        assert_eq!(scores.ty, Type::Map);
        assert_eq!(scores.key_schema.as_ref().unwrap().ty, Type::String);
        assert_eq!(scores.value_schema.as_ref().unwrap().ty, Type::String);
        assert_eq!(field_type(&out, &["contact", "zip"]), Type::String);
        assert_eq!(field_type(&out, &["contact", "email"]), Type::String);
        assert_eq!(field_type(&out, &["age"]), Type::Int32);
    }

    #[test]
    fn map_keys_are_never_mapped() {
        let input = Schema::structure().with_field("m", Schema::map(Schema::of(Type::Int32), Schema::of(Type::Boolean)));
        let s = settings(CipherMode::Encrypt, FieldMode::Element, vec![FieldConfig::new("m")]);
        let out = SchemaAdapter::new(&s).adapt(&input).unwrap();
        let m = &out.field("m").unwrap().schema;
        assert_eq!(m.key_schema.as_ref().unwrap().ty, Type::Int32);
        assert_eq!(m.value_schema.as_ref().unwrap().ty, Type::String);
    }

    #[test]
    fn decrypt_uses_override_and_keeps_optionality() {
        let encrypted = Schema::structure().with_field("age", Schema::string().optional());
        let s = settings(
            CipherMode::Decrypt,
            FieldMode::Element,
            vec![FieldConfig::new("age").with_schema(Schema::of(Type::Int64))],
        );
        let out = SchemaAdapter::new(&s).adapt(&encrypted).unwrap();
        let age = &out.field("age").unwrap().schema;
        assert_eq!(age.ty, Type::Int64);
        assert!(age.optional);
    }

    #[test]
    fn decrypt_object_mode_restores_container() {
        let encrypted = Schema::structure().with_field("tags", Schema::string());
        let s = settings(
            CipherMode::Decrypt,
            FieldMode::Object,
            vec![FieldConfig::new("tags").with_schema(Schema::array(Schema::of(Type::Int8)))],
        );
        let out = SchemaAdapter::new(&s).adapt(&encrypted).unwrap();
        let tags = &out.field("tags").unwrap().schema;
        assert_eq!(tags.ty, Type::Array);
        assert_eq!(tags.value_schema.as_ref().unwrap().ty, Type::Int8);
    }

    #[test]
    fn decrypt_without_override_names_the_path() {
        let encrypted = Schema::structure()
            .with_field("contact", Schema::structure().with_field("email", Schema::string()));
        let s = settings(CipherMode::Decrypt, FieldMode::Element, vec![FieldConfig::new("contact.email")]);
        let err = SchemaAdapter::new(&s).adapt(&encrypted).unwrap_err();
        assert!(matches!(err, SchemaError::Configuration(ConfigurationError(ref m)) if m.contains("contact.email")));
    }

    #[test]
    fn top_level_must_be_struct() {
        let s = settings(CipherMode::Encrypt, FieldMode::Element, vec![]);
        assert_eq!(
            SchemaAdapter::new(&s).adapt(&Schema::string()),
            Err(SchemaError::NotAStruct(Type::String))
        );
    }

    #[test]
    fn array_without_element_schema_is_incomplete() {
        let input = Schema::structure().with_field("a", Schema::of(Type::Array));
        let s = settings(CipherMode::Encrypt, FieldMode::Element, vec![FieldConfig::new("a")]);
        assert!(matches!(
            SchemaAdapter::new(&s).adapt(&input),
            Err(SchemaError::Incomplete { ty: Type::Array, .. })
        ));
    }

    #[test]
    fn unconfigured_fields_are_shared() {
        let input = person();
        let s = settings(CipherMode::Encrypt, FieldMode::Element, vec![FieldConfig::new("name")]);
        let out = SchemaAdapter::new(&s).adapt(&input).unwrap();
        assert!(Arc::ptr_eq(
            &input.field("tags").unwrap().schema,
            &out.field("tags").unwrap().schema
        ));
    }
}
