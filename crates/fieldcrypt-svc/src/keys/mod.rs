//! Key vault selection and the background expiry sweep.
//!
//! # Lifecycle
//!
//! 1. At startup, [`build_vault`] builds the vault named by `KEY_SOURCE`. Secret
//!    store vaults pre-load every enabled key version they can list.
//! 2. Request handlers read keys through the vault; cold keys are fetched on
//!    first use and cached for the configured expiry.
//! 3. [`expiry_task`] sweeps expired keys on a fixed interval, zeroing their bytes.
//!
//! # Security invariants
//!
//! - Key bytes are never logged; only identifiers and counts are.
//! - An expired key is wiped from memory even when no request touches it again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fieldcrypt::keys::{ConfigKeyVault, KeyVault, SecretStore, SecretStoreKeyVault, UnwrapKeyStrategy};
use fieldcrypt::settings::KeySource;
use fieldcrypt::CipherField;
use tokio::runtime::Handle;
use tokio::time;
use tracing::{debug, info};

use crate::aws::{AwsClients, AwsKms, AwsSecretStore};
use crate::config::Config;

/// Build the key vault selected by `cfg`.
///
/// # Errors
///
/// Returns an error if static keys cannot be decoded or the vault cannot be built.
pub async fn build_vault(cfg: &Config) -> Result<Arc<dyn KeyVault>> {
    let source = cfg.key_source()?;
    info!(key_source = %source, "initialising key vault");

    if source == KeySource::Config {
        let vault = ConfigKeyVault::from_data_keys(&cfg.data_keys()?).context("CIPHER_DATA_KEYS")?;
        return Ok(Arc::new(vault));
    }

    let aws = AwsClients::init().await;
    let runtime = Handle::current();
    let store: Arc<dyn SecretStore> = Arc::new(AwsSecretStore::new(
        aws.secretsmanager.clone(),
        cfg.key_names()?,
        runtime.clone(),
    ));
    let capacity = cfg.cache_capacity()?;
    let ttl = cfg.cache_ttl()?;

    let kms = match source {
        KeySource::SecretsManagerWithKms => {
            let key_id = cfg
                .kms_key_id
                .clone()
                .context("KMS_KEY_ID is required when KEY_SOURCE is SECRETS_MANAGER_WITH_KMS")?;
            Some(AwsKms::new(aws.kms.clone(), key_id, runtime))
        }
        _ => None,
    };

    // Pre-warming blocks on the SDK, which must not happen on an async worker.
    let vault = tokio::task::spawn_blocking(move || match kms {
        Some(kms) => {
            let strategy = Arc::new(UnwrapKeyStrategy::new(Arc::new(kms)));
            SecretStoreKeyVault::new(store, strategy, capacity, ttl)
        }
        None => SecretStoreKeyVault::pass_through(store, capacity, ttl),
    })
    .await
    .context("key vault initialisation panicked")?;

    Ok(Arc::new(vault))
}

/// Spawn a background task that evicts expired keys every `interval`.
pub fn expiry_task(transform: Arc<CipherField>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately; nothing can have expired yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = transform.evict_expired_keys();
            if evicted > 0 {
                info!(evicted, remaining = transform.cached_keys(), "expired data keys evicted");
            } else {
                debug!("no expired data keys");
            }
        }
    })
}
