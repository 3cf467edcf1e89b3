//! Axum HTTP server, routing, and middleware.
//!
//! # Responsibilities
//! - Define the Axum router with all routes and shared middleware.
//! - Inject the shared transform (`AppState`) into handlers.
//! - Map transform failures onto [`common::ServiceError`] status codes.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
