//! Key vaults: where the cipher engine gets raw data-encryption-key bytes from.
//!
//! # Implementations
//!
//! - [`ConfigKeyVault`]: a fixed table decoded from configuration at setup.
//! - [`SecretStoreKeyVault`]: fetched on demand from an external [`SecretStore`],
//!   post-processed by a [`KeyStrategy`], cached with a TTL.
//!
//! # Security invariants
//!
//! - Key bytes are never logged. [`KeyMaterial`] redacts itself in `Debug`.
//! - Every [`KeyMaterial`] is zeroed when dropped; cached entries are zeroed when
//!   evicted.
//! - A missing key is [`KeyVaultError::KeyNotFound`] and is never retried.

pub mod cache;
pub mod config_vault;
pub mod secret_vault;
pub mod strategy;

pub use cache::{RemovalCause, SecretCache};
pub use config_vault::ConfigKeyVault;
pub use secret_vault::{SecretStore, SecretStoreError, SecretStoreKeyVault};
pub use strategy::{KeyManagement, KeyManagementError, KeyStrategy, PassThroughKeyStrategy, UnwrapKeyStrategy};

use thiserror::Error;
use zeroize::Zeroize;

/// Errors produced by a [`KeyVault`] or [`KeyStrategy`].
#[derive(Debug, Error)]
pub enum KeyVaultError {
    /// No key material exists for the identifier.
    #[error("could not find key for identifier '{0}'")]
    KeyNotFound(String),

    /// The external key source failed.
    #[error("key source failed for identifier '{identifier}': {message}")]
    Backend { identifier: String, message: String },

    /// The key strategy could not process the fetched bytes.
    #[error("key strategy failed for identifier '{identifier}': {message}")]
    Strategy { identifier: String, message: String },
}

/// Raw key bytes.
///
/// Cloning copies the bytes; each copy zeroes its buffer when dropped, to minimise
/// the window during which plaintext key material lives in RAM.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(Box<[u8]>);

impl KeyMaterial {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite the bytes with zeros in place, keeping the length.
    pub fn wipe(&mut self) {
        self.0.zeroize();
    }
}

impl From<Vec<u8>> for KeyMaterial {
    /// Copies into an exact-size buffer and wipes the source, spare capacity included.
    fn from(mut bytes: Vec<u8>) -> Self {
        let key = Self(bytes.as_slice().into());
        bytes.zeroize();
        key
    }
}

impl From<&[u8]> for KeyMaterial {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        write!(f, "KeyMaterial([REDACTED; {}])", self.0.len())
    }
}

/// Source of key material by identifier (`<keyName><delimiter><keyVersion>`).
pub trait KeyVault: Send + Sync {
    /// Return a copy of the key bytes for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyVaultError::KeyNotFound`] if the identifier is unknown.
    fn read_key(&self, identifier: &str) -> Result<KeyMaterial, KeyVaultError>;

    /// Number of keys currently held in memory.
    fn cached_keys(&self) -> usize;

    /// Drop expired entries, returning how many were evicted.
    fn evict_expired(&self) -> usize {
        0
    }
}
