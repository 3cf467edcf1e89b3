//! `fieldcrypt`: field-level envelope encryption of structured records.
//!
//! Selected fields of a record are replaced by self-describing ciphertext envelopes
//! (`<keyVersion>#<base64>`) and restored again, leaving the rest of the record
//! untouched. Two record representations are supported:
//!
//! - schemaless records held as `serde_json::Value` objects;
//! - schema-carrying records ([`data::Struct`]) whose output schema is derived and
//!   cached per input schema.
//!
//! # Layout
//!
//! - [`settings`]: field config, data keys, global defaults and their validation.
//! - [`crypto`]: algorithm registry and the envelope engine.
//! - [`keys`]: key vaults, key strategies and the TTL secret cache.
//! - [`serdes`]: typed value <-> bytes.
//! - [`record`]: the traversal shared by both representations.
//! - [`schema`]: output schema derivation and caching.
//! - [`transform`]: [`CipherField`], the per-record entry point.
//!
//! # Invariants
//!
//! - **No key material in logs.** Only key identifiers are ever recorded.
//! - **No field values in logs.** Paths are logged, values never.
//! - **Fail closed.** A field that cannot be processed fails its whole record.

pub mod crypto;
pub mod data;
pub mod keys;
pub mod record;
pub mod schema;
pub mod serdes;
pub mod settings;
pub mod transform;

pub use record::TransformError;
pub use settings::{CipherMode, ConfigurationError, FieldConfig, FieldMode, TransformSettings};
pub use transform::CipherField;
