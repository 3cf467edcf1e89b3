//! Field matching and traversal over both record representations.
//!
//! [`RecordHandler::match_fields`] walks a record depth-first, building the path of
//! every child by joining keys with the configured path delimiter:
//!
//! - A configured path is processed according to the [`FieldMode`].
//! - An unconfigured record-like child (JSON object, `STRUCT`) is descended into.
//! - Anything else is copied unchanged.
//!
//! List elements share the path of their list; map entries extend it with their key.
//! The walk is written once against the [`Node`] trait, implemented for
//! `serde_json::Value` in [`schemaless`] and for the typed [`Value`] in
//! [`schema_aware`].

pub mod schema_aware;
pub mod schemaless;

use thiserror::Error;
use tracing::{debug, trace};

use crate::crypto::{CipherError, FieldCipher};
use crate::data::{DataError, Value};
use crate::schema::SchemaError;
use crate::serdes::{SerdeError, SerdeProcessor};
use crate::settings::{CipherMode, FieldMode, TransformSettings};

/// Failure while processing one matched field.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Serde(#[from] SerdeError),

    #[error(transparent)]
    Data(#[from] DataError),

    /// Decryption found something other than an envelope string.
    #[error("expected a ciphertext envelope, found {0}")]
    NotAnEnvelope(&'static str),
}

/// Failure while transforming a record. Nothing is ever passed through on error.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The record is not something the transform accepts.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A configured field could not be processed.
    #[error("{mode} of field '{path}' failed: {source}")]
    Field {
        mode: CipherMode,
        path: String,
        #[source]
        source: ProcessError,
    },

    /// The output schema could not be derived.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Children of a node, as seen by the walk.
pub enum Children<'a, N> {
    /// Scalar or null.
    Leaf,
    /// Ordered elements sharing the parent's path.
    List(&'a [N]),
    /// Entries of a map that is copied as-is unless configured.
    Map(Vec<(String, &'a N)>),
    /// Named members of a record that is descended into even when unconfigured.
    Record(Vec<(String, &'a N)>),
}

/// A tree node the walk can read and rebuild.
///
/// `Shape` is the description of the *output* node: `()` for schemaless JSON, the
/// output schema for typed values.
pub trait Node: Clone + Sized {
    type Shape: Clone;

    fn children(&self) -> Children<'_, Self>;

    /// Runtime type tag used in field metadata.
    fn type_tag(&self) -> &'static str;

    /// Typed value to serialize for encryption.
    fn to_value(&self) -> Result<Value, DataError>;

    /// Node built from a decrypted value, checked against the output shape.
    fn from_value(value: Value, shape: &Self::Shape) -> Result<Self, DataError>;

    /// Node holding an envelope string.
    fn envelope(text: String) -> Self;

    /// The envelope text, if this node is a string.
    fn as_envelope(&self) -> Option<&str>;

    /// Shape of a list element (`key == None`) or of the entry under `key`.
    fn child_shape(shape: &Self::Shape, key: Option<&str>) -> Result<Self::Shape, DataError>;

    /// Same kind of list as `self` with new elements.
    fn rebuild_list(&self, items: Vec<Self>, shape: &Self::Shape) -> Result<Self, DataError>;

    /// Same kind of map or record as `self` with new values, in the original order.
    fn rebuild_entries(&self, entries: Vec<(String, Self)>, shape: &Self::Shape) -> Result<Self, DataError>;

    fn is_null(&self) -> bool;
}

/// Applies the configured cipher mode to the matched fields of one record.
pub struct RecordHandler<'a> {
    settings: &'a TransformSettings,
    cipher: &'a FieldCipher,
    serdes: &'a dyn SerdeProcessor,
}

impl<'a> RecordHandler<'a> {
    pub fn new(settings: &'a TransformSettings, cipher: &'a FieldCipher, serdes: &'a dyn SerdeProcessor) -> Self {
        Self {
            settings,
            cipher,
            serdes,
        }
    }

    /// Walk the record-like `source`, transforming configured children.
    ///
    /// `shape` describes the output of `source`; `path` is the path of `source`
    /// itself (empty for the top level).
    ///
    /// # Errors
    ///
    /// Fails on the first field that cannot be processed.
    pub fn match_fields<N: Node>(&self, source: &N, shape: &N::Shape, path: &str) -> Result<N, TransformError> {
        let Children::Record(entries) = source.children() else {
            return Ok(source.clone());
        };
        let mut rebuilt = Vec::with_capacity(entries.len());
        for (key, child) in entries {
            let child_path = self.settings.join_path(path, &key);
            let child_shape = N::child_shape(shape, Some(&key))?;
            let value = if self.settings.field(&child_path).is_some() {
                self.process_field(child, &child_shape, &child_path)?
            } else if matches!(child.children(), Children::Record(_)) {
                self.match_fields(child, &child_shape, &child_path)?
            } else {
                child.clone()
            };
            rebuilt.push((key, value));
        }
        Ok(source.rebuild_entries(rebuilt, shape)?)
    }

    fn process_field<N: Node>(&self, node: &N, shape: &N::Shape, path: &str) -> Result<N, TransformError> {
        let mode = self.settings.cipher_mode;
        debug!(mode = %mode, field_mode = %self.settings.field_mode, path = %path, "processing field");
        let result = match self.settings.field_mode {
            FieldMode::Element => self.process_element(node, shape, path),
            FieldMode::Object => self.process_leaf(node, shape, path),
        };
        result.map_err(|source| TransformError::Field {
            mode,
            path: path.to_owned(),
            source,
        })
    }

    fn process_element<N: Node>(&self, node: &N, shape: &N::Shape, path: &str) -> Result<N, ProcessError> {
        match node.children() {
            Children::Leaf => self.process_leaf(node, shape, path),
            Children::List(items) => {
                let item_shape = N::child_shape(shape, None)?;
                let items = items
                    .iter()
                    .map(|item| self.process_element(item, &item_shape, path))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(node.rebuild_list(items, shape)?)
            }
            Children::Map(entries) | Children::Record(entries) => {
                let mut rebuilt = Vec::with_capacity(entries.len());
                for (key, child) in entries {
                    let child_path = self.settings.join_path(path, &key);
                    let child_shape = N::child_shape(shape, Some(&key))?;
                    let value = self.process_element(child, &child_shape, &child_path)?;
                    rebuilt.push((key, value));
                }
                Ok(node.rebuild_entries(rebuilt, shape)?)
            }
        }
    }

    fn process_leaf<N: Node>(&self, node: &N, shape: &N::Shape, path: &str) -> Result<N, ProcessError> {
        if node.is_null() {
            return Ok(node.clone());
        }
        let metadata = self.settings.metadata_for(path, node.type_tag());
        trace!(path = %path, metadata = %metadata, "field metadata");
        match self.settings.cipher_mode {
            CipherMode::Encrypt => {
                let bytes = self.serdes.object_to_bytes(&node.to_value()?)?;
                Ok(N::envelope(self.cipher.cipher(&bytes, &metadata)?))
            }
            CipherMode::Decrypt => {
                let envelope = node
                    .as_envelope()
                    .ok_or_else(|| ProcessError::NotAnEnvelope(node.type_tag()))?;
                let bytes = self.cipher.decipher(envelope, &metadata)?;
                Ok(N::from_value(self.serdes.bytes_to_object(&bytes)?, shape)?)
            }
        }
    }
}
