//! AWS-backed key sources: Secrets Manager as the [`SecretStore`] and KMS as the
//! [`KeyManagement`] service that unwraps data keys.
//!
//! The library traits are synchronous. Both adapters keep a handle to the tokio
//! runtime and block on the SDK future, so they must only be called from the
//! blocking pool (or a thread outside the runtime), never from an async task.
//!
//! [`SecretStore`]: fieldcrypt::keys::SecretStore
//! [`KeyManagement`]: fieldcrypt::keys::KeyManagement

pub mod clients;
pub mod kms;
pub mod secrets;

pub use clients::AwsClients;
pub use kms::AwsKms;
pub use secrets::AwsSecretStore;
