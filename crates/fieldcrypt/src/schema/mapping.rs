//! Primitive type tables used when mirroring a schema.

use crate::data::Type;

/// Kind of every primitive after encryption: the envelope is always a string.
pub const ENCRYPT_TYPES: &[(Type, Type)] = &[
    (Type::Boolean, Type::String),
    (Type::Int8, Type::String),
    (Type::Int16, Type::String),
    (Type::Int32, Type::String),
    (Type::Int64, Type::String),
    (Type::Float32, Type::String),
    (Type::Float64, Type::String),
    (Type::String, Type::String),
    (Type::Bytes, Type::String),
];

/// Kind of every primitive after decryption: the declared kind, unchanged.
pub const DECRYPT_TYPES: &[(Type, Type)] = &[
    (Type::Boolean, Type::Boolean),
    (Type::Int8, Type::Int8),
    (Type::Int16, Type::Int16),
    (Type::Int32, Type::Int32),
    (Type::Int64, Type::Int64),
    (Type::Float32, Type::Float32),
    (Type::Float64, Type::Float64),
    (Type::String, Type::String),
    (Type::Bytes, Type::Bytes),
];

/// Target kind for `ty`, `None` if the table has no row for it.
pub fn lookup(table: &[(Type, Type)], ty: Type) -> Option<Type> {
    table.iter().find(|(from, _)| *from == ty).map(|(_, to)| *to)
}
