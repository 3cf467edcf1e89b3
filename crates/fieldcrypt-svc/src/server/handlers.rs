//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorResponse, HealthResponse, TransformRequest, TransformResponse};
use common::ServiceError;
use fieldcrypt::crypto::CipherError;
use fieldcrypt::keys::KeyVaultError;
use fieldcrypt::record::ProcessError;
use fieldcrypt::TransformError;
use tracing::{error, warn};

use super::state::AppState;

/// `POST /transform`: apply the configured cipher mode to the request payload.
///
/// The transform runs on the blocking pool because a cold key may be fetched
/// from a remote key source while the record is processed.
pub async fn transform(State(state): State<AppState>, Json(req): Json<TransformRequest>) -> Response {
    let transform = state.transform.clone();
    let result = tokio::task::spawn_blocking(move || transform.process_without_schema(&req.payload)).await;

    match result {
        Ok(Ok(payload)) => (StatusCode::OK, Json(TransformResponse { payload })).into_response(),
        Ok(Err(e)) => {
            let err = service_error(&e);
            warn!(error = %e, status = err.http_status(), "transform failed");
            error_response(&err)
        }
        Err(e) => {
            error!(error = %e, "transform task failed");
            error_response(&ServiceError::Internal("transform task failed".into()))
        }
    }
}

/// `GET /health`: liveness check with cache statistics.
pub async fn health(State(state): State<AppState>) -> Response {
    let body = HealthResponse {
        status: "ok".into(),
        keys_cached: state.transform.cached_keys(),
        schemas_cached: state.transform.cached_schemas(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

/// Classify a transform failure for the HTTP boundary.
///
/// An unreachable key source is retryable (503); every other field failure is a
/// property of the record (422).
fn service_error(err: &TransformError) -> ServiceError {
    match err {
        TransformError::InvalidRecord(msg) => ServiceError::BadRequest(msg.clone()),
        TransformError::Field {
            source: ProcessError::Cipher(CipherError::KeyVault(KeyVaultError::Backend { .. })),
            ..
        } => ServiceError::Unavailable(err.to_string()),
        TransformError::Field { .. } => ServiceError::TransformFailure(err.to_string()),
        TransformError::Schema(_) | TransformError::Data(_) => ServiceError::Internal(err.to_string()),
    }
}

fn error_response(err: &ServiceError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err))).into_response()
}
