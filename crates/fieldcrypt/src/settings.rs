//! Transform configuration: field config, data keys and global defaults.
//!
//! Everything here is parsed and validated once at setup. A [`ConfigurationError`]
//! is fatal: the host must not start processing records with invalid settings.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{
    algorithm, FieldMetadata, DEFAULT_ALGORITHM, IDENTIFIER_DELIMITER_DEFAULT, VERSION_DELIMITER_DEFAULT,
};
use crate::data::Schema;
use crate::keys::KeyMaterial;

/// Default separator between the segments of a field path.
pub const PATH_DELIMITER_DEFAULT: &str = ".";

/// Default number of adapted schemas kept in memory.
pub const SCHEMA_CACHE_CAPACITY_DEFAULT: usize = 16;

/// Invalid or incomplete configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

impl ConfigurationError {
    fn invalid(setting: &str, value: &str) -> Self {
        Self(format!("invalid {setting} '{value}'"))
    }
}

/// Direction of the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

/// How a configured container is processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldMode {
    /// Recurse into the container and process every leaf on its own.
    #[default]
    Element,
    /// Serialize the whole container and process it as a single value.
    Object,
}

/// Where data-encryption keys come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeySource {
    /// Static keys from `CIPHER_DATA_KEYS`.
    #[default]
    Config,
    /// Plaintext keys from a secret store.
    SecretsManager,
    /// KMS-wrapped keys from a secret store.
    SecretsManagerWithKms,
}

/// Unit of the key cache expiry duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    #[default]
    Hours,
    Days,
}

impl TimeUnit {
    /// `amount` of this unit as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Fails if `amount` is zero or the duration overflows.
    pub fn duration(self, amount: u64) -> Result<Duration, ConfigurationError> {
        if amount == 0 {
            return Err(ConfigurationError("key cache expiry must be > 0".into()));
        }
        let millis_per_unit: u64 = match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        };
        amount
            .checked_mul(millis_per_unit)
            .map(Duration::from_millis)
            .ok_or_else(|| ConfigurationError(format!("key cache expiry {amount} {self} overflows")))
    }
}

/// Text encoding of the ciphertext inside an envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CipherTextEncoding {
    #[default]
    Base64,
}

macro_rules! keyword_enum {
    ($ty:ty, $setting:literal, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ConfigurationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(ConfigurationError::invalid($setting, s)),
                }
            }
        }
    };
}

keyword_enum!(CipherMode, "cipher mode", {
    CipherMode::Encrypt => "ENCRYPT",
    CipherMode::Decrypt => "DECRYPT",
});

keyword_enum!(FieldMode, "field mode", {
    FieldMode::Element => "ELEMENT",
    FieldMode::Object => "OBJECT",
});

keyword_enum!(KeySource, "key source", {
    KeySource::Config => "CONFIG",
    KeySource::SecretsManager => "SECRETS_MANAGER",
    KeySource::SecretsManagerWithKms => "SECRETS_MANAGER_WITH_KMS",
});

keyword_enum!(TimeUnit, "time unit", {
    TimeUnit::Milliseconds => "MILLISECONDS",
    TimeUnit::Seconds => "SECONDS",
    TimeUnit::Minutes => "MINUTES",
    TimeUnit::Hours => "HOURS",
    TimeUnit::Days => "DAYS",
});

keyword_enum!(CipherTextEncoding, "cipher text encoding", {
    CipherTextEncoding::Base64 => "BASE64",
});

/// Per-path overrides.
///
/// JSON form: `{"name": "contact.ssn", "keyName": "pii", "schema": {"type": "STRING"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    /// Full path of the field, segments joined by the path delimiter.
    pub name: String,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub key_version: Option<String>,
    /// Declared type of the plaintext, needed to decrypt schema-carrying records.
    #[serde(default)]
    pub schema: Option<Schema>,
}

impl FieldConfig {
    /// Config for `name` with no overrides.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            algorithm: None,
            key_name: None,
            key_version: None,
            schema: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_key_name(mut self, name: impl Into<String>) -> Self {
        self.key_name = Some(name.into());
        self
    }

    pub fn with_key_version(mut self, version: impl Into<String>) -> Self {
        self.key_version = Some(version.into());
        self
    }

    pub fn with_key(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.key_name = Some(name.into());
        self.key_version = Some(version.into());
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Parse the JSON field config array.
///
/// # Errors
///
/// Fails if the JSON is invalid.
pub fn parse_field_config(json: &str) -> Result<Vec<FieldConfig>, ConfigurationError> {
    serde_json::from_str(json).map_err(|e| ConfigurationError(format!("invalid field config: {e}")))
}

/// A statically configured data key.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DataKeyConfig {
    pub name: String,
    pub version: String,
    /// Base64 encoded key bytes.
    pub material: String,
}

impl DataKeyConfig {
    /// Vault identifier of this key.
    pub fn identifier(&self) -> String {
        format!("{}{}{}", self.name, IDENTIFIER_DELIMITER_DEFAULT, self.version)
    }

    /// Decoded key bytes.
    ///
    /// # Errors
    ///
    /// Fails if `material` is not valid standard base64.
    pub fn key_bytes(&self) -> Result<KeyMaterial, ConfigurationError> {
        STANDARD
            .decode(self.material.trim())
            .map(KeyMaterial::from)
            .map_err(|e| {
                ConfigurationError(format!("data key '{}' is not valid base64: {e}", self.identifier()))
            })
    }
}

impl fmt::Debug for DataKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKeyConfig")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Parse the JSON static key array.
///
/// # Errors
///
/// Fails if the JSON is invalid.
pub fn parse_data_keys(json: &str) -> Result<Vec<DataKeyConfig>, ConfigurationError> {
    serde_json::from_str(json).map_err(|e| ConfigurationError(format!("invalid data keys: {e}")))
}

/// Validated settings of one transform instance.
#[derive(Debug, Clone)]
pub struct TransformSettings {
    field_config: HashMap<String, FieldConfig>,
    pub cipher_mode: CipherMode,
    pub field_mode: FieldMode,
    pub path_delimiter: String,
    pub algorithm: String,
    pub key_name: String,
    pub key_version: String,
    pub schema_cache_capacity: NonZeroUsize,
}

impl TransformSettings {
    /// Settings with default field mode, delimiter, algorithm and cache capacity.
    ///
    /// # Errors
    ///
    /// Fails if a path is configured more than once.
    pub fn new(
        cipher_mode: CipherMode,
        fields: Vec<FieldConfig>,
        key_name: impl Into<String>,
        key_version: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let mut field_config = HashMap::with_capacity(fields.len());
        for field in fields {
            if let Some(dup) = field_config.insert(field.name.clone(), field) {
                return Err(ConfigurationError(format!(
                    "field '{}' is configured more than once",
                    dup.name
                )));
            }
        }
        Ok(Self {
            field_config,
            cipher_mode,
            field_mode: FieldMode::default(),
            path_delimiter: PATH_DELIMITER_DEFAULT.to_owned(),
            algorithm: DEFAULT_ALGORITHM.to_owned(),
            key_name: key_name.into(),
            key_version: key_version.into(),
            schema_cache_capacity: NonZeroUsize::new(SCHEMA_CACHE_CAPACITY_DEFAULT)
                .unwrap_or(NonZeroUsize::MIN),
        })
    }

    pub fn with_field_mode(mut self, field_mode: FieldMode) -> Self {
        self.field_mode = field_mode;
        self
    }

    pub fn with_path_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.path_delimiter = delimiter.into();
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    pub fn with_schema_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.schema_cache_capacity = capacity;
        self
    }

    /// Check every algorithm name, the delimiter and the default key.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.path_delimiter.is_empty() {
            return Err(ConfigurationError("path delimiter must not be empty".into()));
        }
        if self.key_name.trim().is_empty() {
            return Err(ConfigurationError("default key name must not be empty".into()));
        }
        ensure_key_version(&self.key_version, "default key version")?;
        ensure_algorithm(&self.algorithm)?;
        for field in self.field_config.values() {
            if field.name.is_empty() {
                return Err(ConfigurationError("field name must not be empty".into()));
            }
            if let Some(alg) = &field.algorithm {
                ensure_algorithm(alg)?;
            }
            if field.key_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                return Err(ConfigurationError(format!(
                    "key name of field '{}' must not be empty",
                    field.name
                )));
            }
            if let Some(version) = &field.key_version {
                ensure_key_version(version, &format!("key version of field '{}'", field.name))?;
            }
        }
        Ok(())
    }

    /// Config for an exact path.
    pub fn field(&self, path: &str) -> Option<&FieldConfig> {
        self.field_config.get(path)
    }

    /// Number of configured paths.
    pub fn field_count(&self) -> usize {
        self.field_config.len()
    }

    /// Cipher parameters for the value at `path`: per-field overrides first, then the
    /// global defaults.
    pub fn metadata_for(&self, path: &str, data_type: &str) -> FieldMetadata {
        let field = self.field(path);
        let pick = |over: Option<&String>, default: &str| over.map_or(default, String::as_str).to_owned();
        FieldMetadata::new(
            pick(field.and_then(|f| f.algorithm.as_ref()), &self.algorithm),
            data_type,
            pick(field.and_then(|f| f.key_name.as_ref()), &self.key_name),
            pick(field.and_then(|f| f.key_version.as_ref()), &self.key_version),
        )
    }

    /// Join a parent path and a child key.
    pub fn join_path(&self, parent: &str, key: &str) -> String {
        if parent.is_empty() {
            key.to_owned()
        } else {
            format!("{parent}{}{key}", self.path_delimiter)
        }
    }
}

/// A key version is written in front of the envelope delimiter, so it must not
/// contain that delimiter itself.
fn ensure_key_version(version: &str, setting: &str) -> Result<(), ConfigurationError> {
    if version.trim().is_empty() {
        return Err(ConfigurationError(format!("{setting} must not be empty")));
    }
    if version.contains(VERSION_DELIMITER_DEFAULT) {
        return Err(ConfigurationError(format!(
            "{setting} '{version}' must not contain '{VERSION_DELIMITER_DEFAULT}'"
        )));
    }
    Ok(())
}

fn ensure_algorithm(name: &str) -> Result<(), ConfigurationError> {
    algorithm::algorithm_id(name)
        .map(|_| ())
        .ok_or_else(|| ConfigurationError::invalid("cipher algorithm", name))
}
