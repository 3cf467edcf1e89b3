//! Request and response types of the HTTP API, serialised as JSON.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transform endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /transform`.
///
/// `payload` is a schemaless record (a JSON object). The service applies its
/// configured cipher mode to the configured fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRequest {
    pub payload: serde_json::Value,
}

/// Successful response body for `POST /transform`.
///
/// `payload` mirrors the input structure; configured fields are replaced by
/// `<keyVersion>#<base64>` envelopes (encrypt) or their plaintext (decrypt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformResponse {
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status, `"ok"` when the service can process records.
    pub status: String,
    /// Number of data keys currently held in memory.
    pub keys_cached: usize,
    /// Number of derived output schemas currently cached.
    pub schemas_cached: usize,
}
