//! [`CipherField`]: the per-record entry point for both record representations.

use std::sync::Arc;

use tracing::debug;

use crate::crypto::FieldCipher;
use crate::data::{Struct, Value};
use crate::keys::KeyVault;
use crate::record::{RecordHandler, TransformError};
use crate::schema::{SchemaAdapter, SchemaCache};
use crate::serdes::BincodeSerdeProcessor;
use crate::settings::{ConfigurationError, TransformSettings};

/// Encrypts or decrypts the configured fields of records.
///
/// Built once at setup, then shared across threads; every method takes `&self`.
#[derive(Debug)]
pub struct CipherField {
    settings: TransformSettings,
    cipher: FieldCipher,
    serdes: BincodeSerdeProcessor,
    schemas: SchemaCache,
}

impl CipherField {
    /// Validate `settings` and build the transform.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found in `settings`.
    pub fn new(settings: TransformSettings, vault: Arc<dyn KeyVault>) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        debug!(
            mode = %settings.cipher_mode,
            field_mode = %settings.field_mode,
            fields = settings.field_count(),
            "cipher field transform configured"
        );
        Ok(Self {
            schemas: SchemaCache::new(settings.schema_cache_capacity),
            cipher: FieldCipher::new(vault),
            serdes: BincodeSerdeProcessor,
            settings,
        })
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    /// Transform a schemaless record, which must be a JSON object.
    ///
    /// # Errors
    ///
    /// Fails if the record is not an object or any configured field cannot be
    /// processed.
    pub fn process_without_schema(&self, record: &serde_json::Value) -> Result<serde_json::Value, TransformError> {
        if !record.is_object() {
            return Err(TransformError::InvalidRecord(format!(
                "expected a JSON object, found {}",
                json_kind(record)
            )));
        }
        self.handler().match_fields(record, &(), "")
    }

    /// Transform a schema-carrying record. The result carries the derived output
    /// schema, shared by every record with the same input schema instance.
    ///
    /// # Errors
    ///
    /// Fails if the output schema cannot be derived or any configured field cannot
    /// be processed.
    pub fn process_with_schema(&self, record: &Struct) -> Result<Struct, TransformError> {
        let output = self
            .schemas
            .get_or_adapt(record.schema(), |input| SchemaAdapter::new(&self.settings).adapt(input))?;
        match self.handler().match_fields(&Value::Struct(record.clone()), &output, "")? {
            Value::Struct(s) => Ok(s),
            other => Err(TransformError::InvalidRecord(format!(
                "expected a struct result, found {}",
                other.type_tag()
            ))),
        }
    }

    /// Number of output schemas currently cached.
    pub fn cached_schemas(&self) -> usize {
        self.schemas.len()
    }

    /// Number of keys the vault currently holds in memory.
    pub fn cached_keys(&self) -> usize {
        self.cipher.vault().cached_keys()
    }

    /// Evict expired keys from the vault cache.
    pub fn evict_expired_keys(&self) -> usize {
        self.cipher.vault().evict_expired()
    }

    fn handler(&self) -> RecordHandler<'_> {
        RecordHandler::new(&self.settings, &self.cipher, &self.serdes)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::data::{Schema, Type};
    use crate::keys::{ConfigKeyVault, KeyMaterial};
    use crate::settings::{CipherMode, DataKeyConfig, FieldConfig, FieldMode};

    fn vault() -> Arc<dyn KeyVault> {
        let mut keys = HashMap::new();
        keys.insert("k1/versions/v1".to_owned(), KeyMaterial::from(vec![0x5Au8; 32]));
        Arc::new(ConfigKeyVault::new(keys))
    }

    fn transform(mode: CipherMode, field_mode: FieldMode, fields: Vec<FieldConfig>) -> CipherField {
        let settings = TransformSettings::new(mode, fields, "k1", "v1")
            .unwrap()
            .with_field_mode(field_mode);
        CipherField::new(settings, vault()).unwrap()
    }

    #[test]
    fn ssn_round_trip() {
        let fields = vec![FieldConfig::new("ssn")];
        let enc = transform(CipherMode::Encrypt, FieldMode::Element, fields.clone());
        let dec = transform(CipherMode::Decrypt, FieldMode::Element, fields);

        let record = json!({"ssn": "123-45-6789"});
        let encrypted = enc.process_without_schema(&record).unwrap();
        let envelope = encrypted["ssn"].as_str().unwrap();
        assert!(envelope.starts_with("v1#"));
        assert_eq!(dec.process_without_schema(&encrypted).unwrap(), record);
    }

    #[test]
    fn static_keys_from_config() {
        let key = DataKeyConfig {
            name: "k1".into(),
            version: "v1".into(),
            material: "ERERERERERERERERERERERERERERERERERERERERERE=".into(),
        };
        let vault = ConfigKeyVault::from_data_keys(&[key]).unwrap();
        let settings =
            TransformSettings::new(CipherMode::Encrypt, vec![FieldConfig::new("a")], "k1", "v1").unwrap();
        let enc = CipherField::new(settings, Arc::new(vault)).unwrap();
        assert!(enc.process_without_schema(&json!({"a": 1})).is_ok());
        assert_eq!(enc.cached_keys(), 1);
    }

    #[test]
    fn invalid_settings_rejected() {
        let settings = TransformSettings::new(CipherMode::Encrypt, vec![], "k1", "v1")
            .unwrap()
            .with_algorithm("AES/ECB/PKCS5Padding");
        assert!(CipherField::new(settings, vault()).is_err());
    }

    #[test]
    fn key_version_containing_envelope_delimiter_rejected() {
        let fields = vec![FieldConfig::new("ssn")];
        let settings = TransformSettings::new(CipherMode::Encrypt, fields, "k1", "2024#a").unwrap();
        let err = CipherField::new(settings, vault()).unwrap_err();
        assert!(err.0.contains("2024#a"));

        let fields = vec![FieldConfig::new("ssn").with_key_version("2024#a")];
        let settings = TransformSettings::new(CipherMode::Encrypt, fields, "k1", "v1").unwrap();
        assert!(CipherField::new(settings, vault()).is_err());
    }

    #[test]
    fn non_object_record_rejected() {
        let enc = transform(CipherMode::Encrypt, FieldMode::Element, vec![]);
        assert!(matches!(
            enc.process_without_schema(&json!([1, 2])),
            Err(TransformError::InvalidRecord(_))
        ));
    }

    #[test]
    fn schema_cache_returns_same_instance() {
        let enc = transform(CipherMode::Encrypt, FieldMode::Element, vec![FieldConfig::new("n")]);
        let schema = Arc::new(Schema::structure().with_field("n", Schema::of(Type::Int32)));
        let a = Struct::new(schema.clone()).and_then(|s| s.with("n", Value::Int32(1))).unwrap();
        let b = Struct::new(schema).and_then(|s| s.with("n", Value::Int32(2))).unwrap();

        let out_a = enc.process_with_schema(&a).unwrap();
        let out_b = enc.process_with_schema(&b).unwrap();
        assert!(Arc::ptr_eq(out_a.schema(), out_b.schema()));
        assert_eq!(enc.cached_schemas(), 1);
    }

    #[test]
    fn schema_round_trip() {
        let schema = Arc::new(
            Schema::structure()
                .with_field("name", Schema::string())
                .with_field("tags", Schema::array(Schema::of(Type::Int16)).optional()),
        );
        let record = Struct::new(schema.clone())
            .and_then(|s| s.with("name", Value::from("Alice")))
            .and_then(|s| s.with("tags", Value::Array(vec![Value::Int16(1), Value::Int16(2)])))
            .unwrap();

        let enc = transform(CipherMode::Encrypt, FieldMode::Object, vec![FieldConfig::new("tags")]);
        let encrypted = enc.process_with_schema(&record).unwrap();
        let tags_schema = &encrypted.schema().field("tags").unwrap().schema;
        assert_eq!(tags_schema.ty, Type::String);
        assert!(tags_schema.optional);

        let declared = schema.field("tags").unwrap().schema.as_ref().clone();
        let dec = transform(
            CipherMode::Decrypt,
            FieldMode::Object,
            vec![FieldConfig::new("tags").with_schema(declared)],
        );
        let decrypted = dec.process_with_schema(&encrypted).unwrap();
        assert_eq!(decrypted, record);
    }
}
