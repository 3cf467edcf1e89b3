//! [`KeyManagement`] over AWS KMS `Decrypt`.

use aws_sdk_kms::primitives::Blob;
use fieldcrypt::keys::{KeyManagement, KeyManagementError};
use tokio::runtime::Handle;

/// Unwraps data keys with a fixed KMS key.
#[derive(Clone, Debug)]
pub struct AwsKms {
    client: aws_sdk_kms::Client,
    key_id: String,
    runtime: Handle,
}

impl AwsKms {
    pub fn new(client: aws_sdk_kms::Client, key_id: impl Into<String>, runtime: Handle) -> Self {
        Self {
            client,
            key_id: key_id.into(),
            runtime,
        }
    }
}

impl KeyManagement for AwsKms {
    fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, KeyManagementError> {
        let resp = self
            .runtime
            .block_on(
                self.client
                    .decrypt()
                    .key_id(&self.key_id)
                    .ciphertext_blob(Blob::new(wrapped))
                    .send(),
            )
            .map_err(|e| KeyManagementError(format!("KMS decrypt failed: {e}")))?;
        resp.plaintext()
            .map(|p| p.as_ref().to_vec())
            .ok_or_else(|| KeyManagementError("KMS decrypt response contained no plaintext".into()))
    }
}
