//! [`SecretStoreKeyVault`]: keys fetched from an external secret store and cached.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{KeyMaterial, KeyStrategy, KeyVault, KeyVaultError, PassThroughKeyStrategy, RemovalCause, SecretCache};

/// Failure reported by a [`SecretStore`].
#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret store request failed: {0}")]
    Backend(String),
}

/// External store of versioned secrets addressed by key identifier.
#[cfg_attr(test, mockall::automock)]
pub trait SecretStore: Send + Sync {
    /// Identifiers of every enabled secret version.
    fn list_enabled_identifiers(&self) -> Result<Vec<String>, SecretStoreError>;

    /// Raw bytes stored for `identifier`.
    fn access_secret(&self, identifier: &str) -> Result<Vec<u8>, SecretStoreError>;
}

/// [`KeyVault`] backed by a [`SecretStore`], with a TTL/LRU cache in front.
pub struct SecretStoreKeyVault {
    store: Arc<dyn SecretStore>,
    strategy: Arc<dyn KeyStrategy>,
    cache: SecretCache,
}

impl SecretStoreKeyVault {
    /// Build the vault and pre-warm the cache with every enabled secret version.
    ///
    /// Pre-warming is best effort: failures are logged and the affected keys are
    /// fetched on first use instead.
    pub fn new(
        store: Arc<dyn SecretStore>,
        strategy: Arc<dyn KeyStrategy>,
        capacity: NonZeroUsize,
        ttl: Duration,
    ) -> Self {
        let cache = SecretCache::new(capacity, ttl).with_eviction_listener(|identifier, _, cause| {
            if cause == RemovalCause::Expired {
                debug!(identifier = %identifier, "data key expired");
            }
        });
        let vault = Self {
            store,
            strategy,
            cache,
        };
        vault.prewarm();
        vault
    }

    /// Vault that uses fetched secrets as keys unchanged.
    pub fn pass_through(store: Arc<dyn SecretStore>, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self::new(store, Arc::new(PassThroughKeyStrategy), capacity, ttl)
    }

    fn prewarm(&self) {
        let identifiers = match self.store.list_enabled_identifiers() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "could not list secrets; keys will be fetched on demand");
                return;
            }
        };
        let mut loaded = 0usize;
        for identifier in &identifiers {
            match self.fetch(identifier) {
                Ok(key) => {
                    self.cache.insert(identifier, key);
                    loaded += 1;
                }
                Err(e) => warn!(identifier = %identifier, error = %e, "could not pre-load data key"),
            }
        }
        info!(loaded, listed = identifiers.len(), "data key cache pre-warmed");
    }

    fn fetch(&self, identifier: &str) -> Result<KeyMaterial, KeyVaultError> {
        let raw = self.store.access_secret(identifier).map_err(|e| match e {
            SecretStoreError::NotFound(_) => KeyVaultError::KeyNotFound(identifier.to_owned()),
            SecretStoreError::Backend(message) => KeyVaultError::Backend {
                identifier: identifier.to_owned(),
                message,
            },
        })?;
        let key = self.strategy.process_key(&raw, identifier);
        drop(KeyMaterial::from(raw));
        key
    }
}

impl KeyVault for SecretStoreKeyVault {
    fn read_key(&self, identifier: &str) -> Result<KeyMaterial, KeyVaultError> {
        self.cache
            .get_or_try_insert_with(identifier, || self.fetch(identifier))
    }

    fn cached_keys(&self) -> usize {
        self.cache.len()
    }

    fn evict_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

impl std::fmt::Debug for SecretStoreKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStoreKeyVault")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::strategy::MockKeyManagement;
    use crate::keys::{KeyManagementError, UnwrapKeyStrategy};

    fn capacity() -> NonZeroUsize {
        NonZeroUsize::new(8).unwrap()
    }

    #[test]
    fn prewarm_loads_enabled_versions() {
        let mut store = MockSecretStore::new();
        store
            .expect_list_enabled_identifiers()
            .returning(|| Ok(vec!["k1/versions/1".into(), "k1/versions/2".into()]));
        store
            .expect_access_secret()
            .times(2)
            .returning(|id| Ok(id.as_bytes().to_vec()));

        let vault = SecretStoreKeyVault::pass_through(Arc::new(store), capacity(), Duration::from_secs(60));
        assert_eq!(vault.cached_keys(), 2);
        // Served from cache: the mock allows exactly two fetches.
        assert_eq!(vault.read_key("k1/versions/2").unwrap().as_bytes(), b"k1/versions/2");
    }

    #[test]
    fn listing_failure_does_not_fail_construction() {
        let mut store = MockSecretStore::new();
        store
            .expect_list_enabled_identifiers()
            .returning(|| Err(SecretStoreError::Backend("throttled".into())));
        store
            .expect_access_secret()
            .times(1)
            .returning(|_| Ok(vec![1u8; 16]));

        let vault = SecretStoreKeyVault::pass_through(Arc::new(store), capacity(), Duration::from_secs(60));
        assert_eq!(vault.cached_keys(), 0);
        assert_eq!(vault.read_key("k/versions/1").unwrap().len(), 16);
        assert_eq!(vault.read_key("k/versions/1").unwrap().len(), 16);
    }

    #[test]
    fn missing_secret_is_key_not_found() {
        let mut store = MockSecretStore::new();
        store.expect_list_enabled_identifiers().returning(|| Ok(vec![]));
        store
            .expect_access_secret()
            .returning(|id| Err(SecretStoreError::NotFound(id.to_owned())));

        let vault = SecretStoreKeyVault::pass_through(Arc::new(store), capacity(), Duration::from_secs(60));
        assert!(matches!(
            vault.read_key("gone/versions/1"),
            Err(KeyVaultError::KeyNotFound(id)) if id == "gone/versions/1"
        ));
    }

    #[test]
    fn expired_keys_are_refetched() {
        let mut store = MockSecretStore::new();
        store.expect_list_enabled_identifiers().returning(|| Ok(vec![]));
        store
            .expect_access_secret()
            .times(2)
            .returning(|_| Ok(vec![3u8; 32]));

        let vault = SecretStoreKeyVault::pass_through(Arc::new(store), capacity(), Duration::ZERO);
        vault.read_key("k/versions/1").unwrap();
        assert_eq!(vault.evict_expired(), 1);
        assert_eq!(vault.cached_keys(), 0);
        vault.read_key("k/versions/1").unwrap();
    }

    #[test]
    fn strategy_unwraps_fetched_bytes() {
        let mut store = MockSecretStore::new();
        store.expect_list_enabled_identifiers().returning(|| Ok(vec![]));
        store.expect_access_secret().returning(|_| Ok(vec![0xEE; 8]));

        let mut kms = MockKeyManagement::new();
        kms.expect_unwrap_key()
            .withf(|wrapped| wrapped == [0xEEu8; 8])
            .returning(|_| Ok(vec![0x11; 32]));

        let vault = SecretStoreKeyVault::new(
            Arc::new(store),
            Arc::new(UnwrapKeyStrategy::new(Arc::new(kms))),
            capacity(),
            Duration::from_secs(60),
        );
        assert_eq!(vault.read_key("k/versions/1").unwrap().as_bytes(), &[0x11; 32]);
    }

    #[test]
    fn strategy_failure_is_not_cached() {
        let mut store = MockSecretStore::new();
        store.expect_list_enabled_identifiers().returning(|| Ok(vec![]));
        store.expect_access_secret().returning(|_| Ok(vec![0xEE; 8]));

        let mut kms = MockKeyManagement::new();
        kms.expect_unwrap_key()
            .returning(|_| Err(KeyManagementError("denied".into())));

        let vault = SecretStoreKeyVault::new(
            Arc::new(store),
            Arc::new(UnwrapKeyStrategy::new(Arc::new(kms))),
            capacity(),
            Duration::from_secs(60),
        );
        assert!(matches!(vault.read_key("k/versions/1"), Err(KeyVaultError::Strategy { .. })));
        assert_eq!(vault.cached_keys(), 0);
    }
}
