//! [`SecretStore`] over AWS Secrets Manager.
//!
//! A key identifier `<name>/versions/<version>` addresses secret `<name>` at
//! version id `<version>`. A version is enabled while it carries at least one
//! staging label.

use aws_sdk_secretsmanager::error::SdkError;
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fieldcrypt::crypto::IDENTIFIER_DELIMITER_DEFAULT;
use fieldcrypt::keys::{SecretStore, SecretStoreError};
use tokio::runtime::Handle;
use tracing::debug;

/// Reads data keys from Secrets Manager.
///
/// Listing is limited to `key_names`, the secrets the transform is configured to
/// use; the rest of the account is never enumerated.
#[derive(Clone, Debug)]
pub struct AwsSecretStore {
    client: aws_sdk_secretsmanager::Client,
    key_names: Vec<String>,
    runtime: Handle,
}

impl AwsSecretStore {
    pub fn new(client: aws_sdk_secretsmanager::Client, key_names: Vec<String>, runtime: Handle) -> Self {
        Self {
            client,
            key_names,
            runtime,
        }
    }

    fn list_versions(&self, name: &str) -> Result<Vec<String>, SecretStoreError> {
        let mut identifiers = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .runtime
                .block_on(
                    self.client
                        .list_secret_version_ids()
                        .secret_id(name)
                        .set_next_token(next_token.take())
                        .send(),
                )
                .map_err(|e| SecretStoreError::Backend(format!("listing versions of '{name}': {e}")))?;

            identifiers.extend(
                page.versions()
                    .iter()
                    .filter(|v| !v.version_stages().is_empty())
                    .filter_map(|v| v.version_id())
                    .map(|version| format!("{name}{IDENTIFIER_DELIMITER_DEFAULT}{version}")),
            );

            match page.next_token() {
                Some(token) => next_token = Some(token.to_owned()),
                None => break,
            }
        }
        debug!(secret = %name, versions = identifiers.len(), "listed secret versions");
        Ok(identifiers)
    }
}

impl SecretStore for AwsSecretStore {
    fn list_enabled_identifiers(&self) -> Result<Vec<String>, SecretStoreError> {
        let mut identifiers = Vec::new();
        for name in &self.key_names {
            identifiers.extend(self.list_versions(name)?);
        }
        Ok(identifiers)
    }

    fn access_secret(&self, identifier: &str) -> Result<Vec<u8>, SecretStoreError> {
        let (name, version) = split_identifier(identifier)?;
        let resp = self
            .runtime
            .block_on(
                self.client
                    .get_secret_value()
                    .secret_id(name)
                    .version_id(version)
                    .send(),
            )
            .map_err(|e| access_error(identifier, e))?;

        if let Some(binary) = resp.secret_binary() {
            return Ok(binary.as_ref().to_vec());
        }
        let text = resp
            .secret_string()
            .ok_or_else(|| SecretStoreError::Backend(format!("secret '{identifier}' has no value")))?;
        STANDARD
            .decode(text.trim())
            .map_err(|e| SecretStoreError::Backend(format!("secret '{identifier}' is not valid base64: {e}")))
    }
}

fn access_error(identifier: &str, err: SdkError<GetSecretValueError>) -> SecretStoreError {
    match err.as_service_error() {
        Some(e) if e.is_resource_not_found_exception() => SecretStoreError::NotFound(identifier.to_owned()),
        _ => SecretStoreError::Backend(format!("reading '{identifier}': {err}")),
    }
}

/// Split `<name>/versions/<version>` into secret id and version id.
fn split_identifier(identifier: &str) -> Result<(&str, &str), SecretStoreError> {
    match identifier.rsplit_once(IDENTIFIER_DELIMITER_DEFAULT) {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => Ok((name, version)),
        _ => Err(SecretStoreError::NotFound(identifier.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_simple_identifier() {
        assert_eq!(split_identifier("k1/versions/v1").unwrap(), ("k1", "v1"));
    }

    #[test]
    fn split_keeps_path_style_names() {
        assert_eq!(
            split_identifier("prod/payments/versions/3").unwrap(),
            ("prod/payments", "3")
        );
    }

    #[test]
    fn split_rejects_malformed_identifiers() {
        for bad in ["k1", "/versions/v1", "k1/versions/", ""] {
            assert!(
                matches!(split_identifier(bad), Err(SecretStoreError::NotFound(_))),
                "{bad}"
            );
        }
    }
}
