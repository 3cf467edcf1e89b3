//! Configuration loading and validation for the transform service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{Context, Result};
use fieldcrypt::settings::{
    self, CipherTextEncoding, DataKeyConfig, FieldConfig, KeySource, TimeUnit, TransformSettings,
};
use serde::Deserialize;

/// Raw service configuration as read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// JSON array of field configs. **Required.**
    pub field_config: String,

    /// `ENCRYPT` or `DECRYPT`. **Required.**
    pub cipher_mode: String,

    /// `ELEMENT` or `OBJECT`.
    #[serde(default = "default_field_mode")]
    pub field_mode: String,

    /// Separator between field path segments.
    #[serde(default = "default_path_delimiter")]
    pub path_delimiter: String,

    /// Default cipher algorithm name.
    #[serde(default = "default_cipher_algorithm")]
    pub cipher_algorithm: String,

    /// Default key name. **Required.**
    pub cipher_data_key_name: String,

    /// Default key version. **Required.**
    pub cipher_data_key_version: String,

    /// JSON array of static data keys, used with key source `CONFIG`.
    #[serde(default = "default_cipher_data_keys")]
    pub cipher_data_keys: String,

    /// Text encoding of ciphertext; only `base64` is supported.
    #[serde(default = "default_cipher_text_encoding")]
    pub cipher_text_encoding: String,

    /// `CONFIG`, `SECRETS_MANAGER` or `SECRETS_MANAGER_WITH_KMS`.
    #[serde(default = "default_key_source")]
    pub key_source: String,

    /// KMS key used to unwrap data keys. Required with `SECRETS_MANAGER_WITH_KMS`.
    #[serde(default)]
    pub kms_key_id: Option<String>,

    /// How long a fetched data key stays cached, in `..._UNIT`s.
    #[serde(default = "default_cache_expiry_duration")]
    pub cipher_data_key_cache_expiry_duration: u64,

    #[serde(default = "default_cache_expiry_duration_unit")]
    pub cipher_data_key_cache_expiry_duration_unit: String,

    /// Maximum number of data keys held in memory.
    #[serde(default = "default_cache_capacity")]
    pub cipher_data_key_cache_capacity: usize,

    /// How often (seconds) expired data keys are swept from the cache.
    #[serde(default = "default_key_expiry_sweep_interval")]
    pub key_expiry_sweep_interval_secs: u64,

    /// Maximum number of derived output schemas held in memory.
    #[serde(default = "default_schema_cache_capacity")]
    pub schema_cache_capacity: usize,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// OTLP endpoint. Spans are only exported when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_field_mode() -> String {
    "ELEMENT".into()
}
fn default_path_delimiter() -> String {
    settings::PATH_DELIMITER_DEFAULT.into()
}
fn default_cipher_algorithm() -> String {
    fieldcrypt::crypto::DEFAULT_ALGORITHM.into()
}
fn default_cipher_data_keys() -> String {
    "[]".into()
}
fn default_cipher_text_encoding() -> String {
    "base64".into()
}
fn default_key_source() -> String {
    "CONFIG".into()
}
fn default_cache_expiry_duration() -> u64 {
    24
}
fn default_cache_expiry_duration_unit() -> String {
    "HOURS".into()
}
fn default_cache_capacity() -> usize {
    256
}
fn default_key_expiry_sweep_interval() -> u64 {
    60
}
fn default_schema_cache_capacity() -> usize {
    settings::SCHEMA_CACHE_CAPACITY_DEFAULT
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.field_config, "FIELD_CONFIG")?;
        ensure_non_empty(&self.cipher_data_key_name, "CIPHER_DATA_KEY_NAME")?;
        ensure_non_empty(&self.cipher_data_key_version, "CIPHER_DATA_KEY_VERSION")?;

        self.cipher_text_encoding
            .parse::<CipherTextEncoding>()
            .context("CIPHER_TEXT_ENCODING")?;
        self.transform_settings()?.validate().context("FIELD_CONFIG")?;
        self.cache_ttl()?;

        if self.key_source()? == KeySource::SecretsManagerWithKms
            && self.kms_key_id.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            anyhow::bail!("KMS_KEY_ID is required when KEY_SOURCE is SECRETS_MANAGER_WITH_KMS");
        }
        if self.key_source()? == KeySource::Config {
            self.data_keys()?;
        }
        if self.cipher_data_key_cache_capacity == 0 {
            anyhow::bail!("CIPHER_DATA_KEY_CACHE_CAPACITY must be > 0");
        }
        if self.key_expiry_sweep_interval_secs == 0 {
            anyhow::bail!("KEY_EXPIRY_SWEEP_INTERVAL_SECS must be > 0");
        }
        if self.schema_cache_capacity == 0 {
            anyhow::bail!("SCHEMA_CACHE_CAPACITY must be > 0");
        }
        Ok(())
    }

    /// Parsed `FIELD_CONFIG`.
    pub fn field_configs(&self) -> Result<Vec<FieldConfig>> {
        settings::parse_field_config(&self.field_config).context("FIELD_CONFIG")
    }

    /// Parsed `CIPHER_DATA_KEYS`.
    pub fn data_keys(&self) -> Result<Vec<DataKeyConfig>> {
        settings::parse_data_keys(&self.cipher_data_keys).context("CIPHER_DATA_KEYS")
    }

    pub fn key_source(&self) -> Result<KeySource> {
        self.key_source.parse().context("KEY_SOURCE")
    }

    /// Key cache expiry from duration and unit.
    pub fn cache_ttl(&self) -> Result<Duration> {
        let unit: TimeUnit = self
            .cipher_data_key_cache_expiry_duration_unit
            .parse()
            .context("CIPHER_DATA_KEY_CACHE_EXPIRY_DURATION_UNIT")?;
        unit.duration(self.cipher_data_key_cache_expiry_duration)
            .context("CIPHER_DATA_KEY_CACHE_EXPIRY_DURATION")
    }

    pub fn cache_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.cipher_data_key_cache_capacity)
            .context("CIPHER_DATA_KEY_CACHE_CAPACITY must be > 0")
    }

    pub fn key_expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.key_expiry_sweep_interval_secs)
    }

    /// Every key name the transform may use: the default plus per-field overrides.
    pub fn key_names(&self) -> Result<Vec<String>> {
        let mut names = vec![self.cipher_data_key_name.clone()];
        for field in self.field_configs()? {
            if let Some(name) = field.key_name {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Transform settings built from the cipher and field variables.
    pub fn transform_settings(&self) -> Result<TransformSettings> {
        let schema_cache_capacity = NonZeroUsize::new(self.schema_cache_capacity)
            .context("SCHEMA_CACHE_CAPACITY must be > 0")?;
        let settings = TransformSettings::new(
            self.cipher_mode.parse().context("CIPHER_MODE")?,
            self.field_configs()?,
            self.cipher_data_key_name.clone(),
            self.cipher_data_key_version.clone(),
        )
        .context("FIELD_CONFIG")?
        .with_field_mode(self.field_mode.parse().context("FIELD_MODE")?)
        .with_path_delimiter(self.path_delimiter.clone())
        .with_algorithm(self.cipher_algorithm.clone())
        .with_schema_cache_capacity(schema_cache_capacity);
        Ok(settings)
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
