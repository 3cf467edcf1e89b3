//! Key strategies: post-processing applied to raw key bytes after they are fetched.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{KeyMaterial, KeyVaultError};

/// Turns fetched bytes into usable key material.
pub trait KeyStrategy: Send + Sync {
    /// Process `raw` bytes fetched for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyVaultError::Strategy`] if the bytes cannot be turned into a key.
    fn process_key(&self, raw: &[u8], identifier: &str) -> Result<KeyMaterial, KeyVaultError>;
}

/// Uses fetched bytes as the key unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughKeyStrategy;

impl KeyStrategy for PassThroughKeyStrategy {
    fn process_key(&self, raw: &[u8], _identifier: &str) -> Result<KeyMaterial, KeyVaultError> {
        Ok(KeyMaterial::from(raw))
    }
}

/// Failure reported by an external key-management service.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct KeyManagementError(pub String);

/// External service holding the key-encryption key (KEK).
#[cfg_attr(test, mockall::automock)]
pub trait KeyManagement: Send + Sync {
    /// Decrypt a wrapped data-encryption key.
    fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, KeyManagementError>;
}

/// Treats fetched bytes as a wrapped DEK and unwraps it through a [`KeyManagement`]
/// service.
#[derive(Clone)]
pub struct UnwrapKeyStrategy {
    kms: Arc<dyn KeyManagement>,
}

impl UnwrapKeyStrategy {
    pub fn new(kms: Arc<dyn KeyManagement>) -> Self {
        Self { kms }
    }
}

impl KeyStrategy for UnwrapKeyStrategy {
    fn process_key(&self, raw: &[u8], identifier: &str) -> Result<KeyMaterial, KeyVaultError> {
        debug!(identifier = %identifier, "unwrapping data key");
        self.kms
            .unwrap_key(raw)
            .map(KeyMaterial::from)
            .map_err(|e| KeyVaultError::Strategy {
                identifier: identifier.to_owned(),
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for UnwrapKeyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnwrapKeyStrategy").finish_non_exhaustive()
    }
}
