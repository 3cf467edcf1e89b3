//! Typed record model for the schema-carrying representation.
//!
//! A [`Struct`] pairs an `Arc<Schema>` with one [`Value`] per declared field. The
//! same schema instance is expected to be shared by many records of the same shape,
//! which is what the schema cache keys on.
//!
//! Everything here is serde-serialisable. The binary encoding used by
//! [`crate::serdes`] relies on the enum tags of [`Value`] for exact type
//! reconstruction, and on [`Struct`] carrying its full schema.

pub mod json;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or converting typed values.
#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    /// A struct was requested for a schema that is not of type `STRUCT`.
    #[error("schema of type {0} cannot back a struct")]
    NotAStruct(Type),

    /// A struct field was addressed that its schema does not declare.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// A value that has no counterpart in the typed model.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A value whose kind differs from the kind its schema declares.
    #[error("expected a value of type {expected}, found {found}")]
    TypeMismatch { expected: Type, found: &'static str },

    /// A struct was rebuilt with the wrong number of values.
    #[error("schema declares {expected} fields, got {found} values")]
    FieldCount { expected: usize, found: usize },
}

/// Kind of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Type {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Array,
    Map,
    Struct,
}

impl Type {
    /// Every primitive kind, in declaration order.
    pub const PRIMITIVES: [Type; 9] = [
        Type::Boolean,
        Type::Int8,
        Type::Int16,
        Type::Int32,
        Type::Int64,
        Type::Float32,
        Type::Float64,
        Type::String,
        Type::Bytes,
    ];

    /// Returns `true` for leaf kinds (everything except ARRAY, MAP and STRUCT).
    pub fn is_primitive(self) -> bool {
        !matches!(self, Type::Array | Type::Map | Type::Struct)
    }

    /// Canonical upper-case name, e.g. `"INT32"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Type::Boolean => "BOOLEAN",
            Type::Int8 => "INT8",
            Type::Int16 => "INT16",
            Type::Int32 => "INT32",
            Type::Int64 => "INT64",
            Type::Float32 => "FLOAT32",
            Type::Float64 => "FLOAT64",
            Type::String => "STRING",
            Type::Bytes => "BYTES",
            Type::Array => "ARRAY",
            Type::Map => "MAP",
            Type::Struct => "STRUCT",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural description of a value.
///
/// The JSON form (used for per-field schema overrides in the field config) looks like
/// `{"type": "ARRAY", "optional": true, "valueSchema": {"type": "INT32"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub doc: Option<String>,
    /// Declared fields, in order. Only meaningful for `STRUCT`.
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Only meaningful for `MAP`.
    #[serde(default)]
    pub key_schema: Option<Arc<Schema>>,
    /// Element schema for `ARRAY`, value schema for `MAP`.
    #[serde(default)]
    pub value_schema: Option<Arc<Schema>>,
}

/// A named member of a `STRUCT` schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub schema: Arc<Schema>,
}

impl Schema {
    /// A required schema of the given kind with no children.
    pub fn of(ty: Type) -> Self {
        Self {
            ty,
            optional: false,
            name: None,
            version: None,
            doc: None,
            fields: Vec::new(),
            key_schema: None,
            value_schema: None,
        }
    }

    pub fn string() -> Self {
        Self::of(Type::String)
    }

    pub fn array(value_schema: Schema) -> Self {
        Self {
            value_schema: Some(Arc::new(value_schema)),
            ..Self::of(Type::Array)
        }
    }

    pub fn map(key_schema: Schema, value_schema: Schema) -> Self {
        Self {
            key_schema: Some(Arc::new(key_schema)),
            value_schema: Some(Arc::new(value_schema)),
            ..Self::of(Type::Map)
        }
    }

    /// An empty `STRUCT` schema; add members with [`Schema::with_field`].
    pub fn structure() -> Self {
        Self::of(Type::Struct)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema: Arc::new(schema),
        });
        self
    }

    /// Copy of this schema's descriptive attributes with a different kind and no children.
    pub fn retyped(&self, ty: Type) -> Self {
        Self {
            ty,
            optional: self.optional,
            name: self.name.clone(),
            version: self.version,
            doc: self.doc.clone(),
            fields: Vec::new(),
            key_schema: None,
            value_schema: None,
        }
    }

    /// Look up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A record conforming to a `STRUCT` schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Struct {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Struct {
    /// Create a struct with every field set to [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotAStruct`] if `schema` is not of type `STRUCT`.
    pub fn new(schema: Arc<Schema>) -> Result<Self, DataError> {
        if schema.ty != Type::Struct {
            return Err(DataError::NotAStruct(schema.ty));
        }
        let values = vec![Value::Null; schema.fields.len()];
        Ok(Self { schema, values })
    }

    /// Assemble a struct from values already in schema field order.
    ///
    /// # Errors
    ///
    /// Fails if `schema` is not a `STRUCT` or the value count does not match.
    pub fn from_values(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self, DataError> {
        if schema.ty != Type::Struct {
            return Err(DataError::NotAStruct(schema.ty));
        }
        if schema.fields.len() != values.len() {
            return Err(DataError::FieldCount {
                expected: schema.fields.len(),
                found: values.len(),
            });
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Value of the named field, if the schema declares it.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.schema.fields.iter().position(|f| f.name == name)?;
        self.values.get(idx)
    }

    /// Set the named field.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnknownField`] if the schema has no such field.
    pub fn put(&mut self, name: &str, value: Value) -> Result<(), DataError> {
        let idx = self
            .schema
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| DataError::UnknownField(name.to_owned()))?;
        self.values[idx] = value;
        Ok(())
    }

    /// Builder-style [`Struct::put`].
    pub fn with(mut self, name: &str, value: Value) -> Result<Self, DataError> {
        self.put(name, value)?;
        Ok(self)
    }

    /// Declared fields paired with their current values, in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&Field, &Value)> {
        self.schema.fields.iter().zip(self.values.iter())
    }
}

/// A typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Entries in insertion order.
    Map(Vec<(Value, Value)>),
    Struct(Struct),
}

impl Value {
    /// Schema kind of this value, `None` for [`Value::Null`].
    pub fn schema_type(&self) -> Option<Type> {
        Some(match self {
            Value::Null => return None,
            Value::Boolean(_) => Type::Boolean,
            Value::Int8(_) => Type::Int8,
            Value::Int16(_) => Type::Int16,
            Value::Int32(_) => Type::Int32,
            Value::Int64(_) => Type::Int64,
            Value::Float32(_) => Type::Float32,
            Value::Float64(_) => Type::Float64,
            Value::String(_) => Type::String,
            Value::Bytes(_) => Type::Bytes,
            Value::Array(_) => Type::Array,
            Value::Map(_) => Type::Map,
            Value::Struct(_) => Type::Struct,
        })
    }

    /// Runtime type tag recorded in field metadata.
    pub fn type_tag(&self) -> &'static str {
        self.schema_type().map(Type::as_str).unwrap_or("NULL")
    }

    /// Check this value against `schema` and rebuild it on that schema instance.
    ///
    /// Struct members are matched by name, not position. Array elements and map
    /// entries are checked against the element schemas. Nulls conform to any schema.
    ///
    /// # Errors
    ///
    /// [`DataError::TypeMismatch`] when a kind differs from the declared kind,
    /// [`DataError::UnknownField`] when struct members do not match the declared
    /// fields.
    pub fn conform(self, schema: &Arc<Schema>) -> Result<Value, DataError> {
        let mismatch = |found: &Value| DataError::TypeMismatch {
            expected: schema.ty,
            found: found.type_tag(),
        };
        match self {
            Value::Null => Ok(Value::Null),
            Value::Struct(s) if schema.ty == Type::Struct => {
                if let Some((extra, _)) = s.fields().find(|(f, _)| schema.field(&f.name).is_none()) {
                    return Err(DataError::UnknownField(extra.name.clone()));
                }
                let values = schema
                    .fields
                    .iter()
                    .map(|field| {
                        s.get(&field.name)
                            .cloned()
                            .ok_or_else(|| DataError::UnknownField(field.name.clone()))
                            .and_then(|v| v.conform(&field.schema))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Struct(Struct::from_values(schema.clone(), values)?))
            }
            Value::Array(items) if schema.ty == Type::Array => match &schema.value_schema {
                Some(element) => Ok(Value::Array(
                    items.into_iter().map(|v| v.conform(element)).collect::<Result<_, _>>()?,
                )),
                None => Ok(Value::Array(items)),
            },
            Value::Map(entries) if schema.ty == Type::Map => Ok(Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| {
                        let k = match &schema.key_schema {
                            Some(ks) => k.conform(ks)?,
                            None => k,
                        };
                        let v = match &schema.value_schema {
                            Some(vs) => v.conform(vs)?,
                            None => v,
                        };
                        Ok((k, v))
                    })
                    .collect::<Result<_, DataError>>()?,
            )),
            other if other.schema_type() == Some(schema.ty) && schema.ty.is_primitive() => Ok(other),
            other => Err(mismatch(&other)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Renders scalar values the way they appear in a field path (map keys).
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int8(n) => write!(f, "{n}"),
            Value::Int16(n) => write!(f, "{n}"),
            Value::Int32(n) => write!(f, "{n}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::Float32(n) => write!(f, "{n}"),
            Value::Float64(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            other => write!(f, "<{}>", other.type_tag()),
        }
    }
}
