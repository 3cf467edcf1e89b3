//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use fieldcrypt::CipherField;

/// Application state shared across all request handlers.
///
/// Cloned per request; the transform itself is shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Configured field transform, including its key and schema caches.
    pub transform: Arc<CipherField>,
}

impl AppState {
    pub fn new(transform: Arc<CipherField>) -> Self {
        Self { transform }
    }
}
