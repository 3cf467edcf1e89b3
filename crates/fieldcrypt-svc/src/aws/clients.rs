//! AWS SDK client bundle.

use aws_config::BehaviorVersion;

/// KMS and Secrets Manager clients sharing one [`aws_config::SdkConfig`], so
/// credentials and region are resolved once and reused.
#[derive(Clone, Debug)]
pub struct AwsClients {
    /// Unwraps KMS-encrypted data keys.
    pub kms: aws_sdk_kms::Client,
    /// Holds data keys as versioned secrets.
    pub secretsmanager: aws_sdk_secretsmanager::Client,
}

impl AwsClients {
    /// Load the SDK config from the standard provider chain (environment, profile,
    /// instance role) and build the clients.
    pub async fn init() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self {
            kms: aws_sdk_kms::Client::new(&config),
            secretsmanager: aws_sdk_secretsmanager::Client::new(&config),
        }
    }
}
