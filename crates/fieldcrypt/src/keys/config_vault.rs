//! [`ConfigKeyVault`]: keys supplied directly in configuration.

use std::collections::HashMap;
use std::sync::Arc;

use super::{KeyMaterial, KeyStrategy, KeyVault, KeyVaultError, PassThroughKeyStrategy};
use crate::settings::{ConfigurationError, DataKeyConfig};

/// Static identifier -> key table built once at setup.
pub struct ConfigKeyVault {
    keys: HashMap<String, KeyMaterial>,
    strategy: Arc<dyn KeyStrategy>,
}

impl ConfigKeyVault {
    /// Vault over already decoded keys, handed out unchanged.
    pub fn new(keys: HashMap<String, KeyMaterial>) -> Self {
        Self::with_strategy(keys, Arc::new(PassThroughKeyStrategy))
    }

    /// Vault whose keys are passed through `strategy` on every read.
    pub fn with_strategy(keys: HashMap<String, KeyMaterial>, strategy: Arc<dyn KeyStrategy>) -> Self {
        Self { keys, strategy }
    }

    /// Decode every configured data key.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if any key material is not valid base64 or an
    /// identifier appears twice.
    pub fn from_data_keys(configs: &[DataKeyConfig]) -> Result<Self, ConfigurationError> {
        let mut keys = HashMap::with_capacity(configs.len());
        for cfg in configs {
            let identifier = cfg.identifier();
            if keys.insert(identifier.clone(), cfg.key_bytes()?).is_some() {
                return Err(ConfigurationError(format!(
                    "data key '{identifier}' is configured more than once"
                )));
            }
        }
        Ok(Self::new(keys))
    }
}

impl KeyVault for ConfigKeyVault {
    fn read_key(&self, identifier: &str) -> Result<KeyMaterial, KeyVaultError> {
        let raw = self
            .keys
            .get(identifier)
            .ok_or_else(|| KeyVaultError::KeyNotFound(identifier.to_owned()))?;
        self.strategy.process_key(raw.as_bytes(), identifier)
    }

    fn cached_keys(&self) -> usize {
        self.keys.len()
    }
}

impl std::fmt::Debug for ConfigKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.keys.keys().collect();
        ids.sort();
        f.debug_struct("ConfigKeyVault").field("identifiers", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_key(name: &str, version: &str, material: &str) -> DataKeyConfig {
        DataKeyConfig {
            name: name.into(),
            version: version.into(),
            material: material.into(),
        }
    }

    #[test]
    fn reads_decoded_key() {
        // 16 bytes of 0x00, base64.
        let vault =
            ConfigKeyVault::from_data_keys(&[data_key("k1", "v1", "AAAAAAAAAAAAAAAAAAAAAA==")])
                .unwrap();
        let key = vault.read_key("k1/versions/v1").unwrap();
        assert_eq!(key.as_bytes(), &[0u8; 16]);
        assert_eq!(vault.cached_keys(), 1);
    }

    #[test]
    fn unknown_identifier_is_key_not_found() {
        let vault = ConfigKeyVault::new(HashMap::new());
        assert!(matches!(
            vault.read_key("nope/versions/1"),
            Err(KeyVaultError::KeyNotFound(id)) if id == "nope/versions/1"
        ));
    }

    #[test]
    fn invalid_material_rejected_at_setup() {
        assert!(ConfigKeyVault::from_data_keys(&[data_key("k1", "v1", "%%%")]).is_err());
    }

    #[test]
    fn duplicate_identifier_rejected() {
        let key = data_key("k1", "v1", "AAAAAAAAAAAAAAAAAAAAAA==");
        assert!(ConfigKeyVault::from_data_keys(&[key.clone(), key]).is_err());
    }

    #[test]
    fn debug_lists_identifiers_only() {
        let vault =
            ConfigKeyVault::from_data_keys(&[data_key("k1", "v1", "AAAAAAAAAAAAAAAAAAAAAA==")])
                .unwrap();
        let dbg = format!("{vault:?}");
        assert!(dbg.contains("k1/versions/v1"));
        assert!(!dbg.contains("AAAA"));
    }
}
