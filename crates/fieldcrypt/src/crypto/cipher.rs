//! The cipher engine: byte payloads to self-describing ciphertext envelopes and back.
//!
//! # Envelope format
//!
//! ```text
//! [<keyVersion><delimiter>]<base64(nonce || ciphertext+tag)>
//! ```
//!
//! The version prefix is always written. It lets a value encrypted under an older
//! key version be decrypted after the configured default version has moved on, as
//! long as the vault can still produce that version's key.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::trace;

use super::algorithm::{self, AlgorithmError, AlgorithmId};
use crate::keys::{KeyVault, KeyVaultError};

/// Default separator between key version and ciphertext in an envelope.
pub const VERSION_DELIMITER_DEFAULT: &str = "#";

/// Default separator between key name and key version in a key identifier.
pub const IDENTIFIER_DELIMITER_DEFAULT: &str = "/versions/";

/// Errors produced by the cipher engine.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The algorithm name is not in the registry.
    #[error("unknown cipher algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// The envelope does not have the expected `[version#]base64` layout.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// The key could not be obtained from the vault.
    #[error(transparent)]
    KeyVault(#[from] KeyVaultError),

    /// The algorithm rejected the key or the ciphertext.
    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),
}

/// Per-field parameters for a single cipher operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    pub algorithm: String,
    /// Runtime type tag of the value being processed.
    pub data_type: String,
    pub key_name: String,
    pub key_version: String,
    /// Separator used to build the key identifier.
    pub delimiter: String,
}

impl FieldMetadata {
    /// Build metadata with the default identifier delimiter.
    pub fn new(
        algorithm: impl Into<String>,
        data_type: impl Into<String>,
        key_name: impl Into<String>,
        key_version: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            data_type: data_type.into(),
            key_name: key_name.into(),
            key_version: key_version.into(),
            delimiter: IDENTIFIER_DELIMITER_DEFAULT.to_owned(),
        }
    }

    /// Registry id of the configured algorithm.
    pub fn algorithm_id(&self) -> Result<AlgorithmId, CipherError> {
        algorithm::algorithm_id(&self.algorithm)
            .ok_or_else(|| CipherError::UnknownAlgorithm(self.algorithm.clone()))
    }

    /// Key identifier for the configured version.
    pub fn identifier(&self) -> String {
        self.identifier_for(&self.key_version)
    }

    /// Key identifier for an explicit version of the same key.
    pub fn identifier_for(&self, key_version: &str) -> String {
        format!("{}{}{}", self.key_name, self.delimiter, key_version)
    }
}

impl fmt::Display for FieldMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "algorithm={} data_type={} key={}",
            self.algorithm,
            self.data_type,
            self.identifier()
        )
    }
}

/// Turns plaintext bytes into envelopes and back, fetching keys from a [`KeyVault`].
#[derive(Clone)]
pub struct FieldCipher {
    vault: Arc<dyn KeyVault>,
    version_delimiter: String,
}

impl FieldCipher {
    /// Create an engine with the default `#` version delimiter.
    pub fn new(vault: Arc<dyn KeyVault>) -> Self {
        Self::with_delimiter(vault, VERSION_DELIMITER_DEFAULT)
    }

    pub fn with_delimiter(vault: Arc<dyn KeyVault>, version_delimiter: impl Into<String>) -> Self {
        Self {
            vault,
            version_delimiter: version_delimiter.into(),
        }
    }

    /// The vault backing this engine.
    pub fn vault(&self) -> &Arc<dyn KeyVault> {
        &self.vault
    }

    /// Encrypt `plaintext` and wrap it in a version-prefixed envelope.
    ///
    /// # Errors
    ///
    /// Fails if the algorithm is unknown, the key is missing from the vault, or the
    /// algorithm rejects the key.
    pub fn cipher(&self, plaintext: &[u8], metadata: &FieldMetadata) -> Result<String, CipherError> {
        let alg = resolve(metadata)?;
        let identifier = metadata.identifier();
        trace!(identifier = %identifier, "enciphering field");
        let key = self.vault.read_key(&identifier)?;
        let sealed = alg.cipher(plaintext, key.as_bytes())?;
        Ok(format!(
            "{}{}{}",
            metadata.key_version,
            self.version_delimiter,
            STANDARD.encode(sealed)
        ))
    }

    /// Decrypt an envelope produced by [`FieldCipher::cipher`].
    ///
    /// A version embedded in the envelope takes precedence over
    /// `metadata.key_version`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MalformedCiphertext`] if the envelope contains the
    /// delimiter more than once or its payload is not valid base64, plus the failure
    /// modes of [`FieldCipher::cipher`].
    pub fn decipher(&self, envelope: &str, metadata: &FieldMetadata) -> Result<Vec<u8>, CipherError> {
        let alg = resolve(metadata)?;
        let segments: Vec<&str> = envelope.split(self.version_delimiter.as_str()).collect();
        let (identifier, payload) = match segments.as_slice() {
            [payload] => (metadata.identifier(), *payload),
            [version, payload] => (metadata.identifier_for(version), *payload),
            other => {
                return Err(CipherError::MalformedCiphertext(format!(
                    "expected at most one '{}' delimiter, found {}",
                    self.version_delimiter,
                    other.len() - 1
                )))
            }
        };
        let sealed = STANDARD
            .decode(payload)
            .map_err(|e| CipherError::MalformedCiphertext(format!("invalid base64: {e}")))?;
        trace!(identifier = %identifier, "deciphering field");
        let key = self.vault.read_key(&identifier)?;
        Ok(alg.decipher(&sealed, key.as_bytes())?)
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher")
            .field("version_delimiter", &self.version_delimiter)
            .finish_non_exhaustive()
    }
}

fn resolve(metadata: &FieldMetadata) -> Result<&'static dyn algorithm::CryptoAlgorithm, CipherError> {
    let id = metadata.algorithm_id()?;
    algorithm::algorithm(id).ok_or_else(|| CipherError::UnknownAlgorithm(metadata.algorithm.clone()))
}
