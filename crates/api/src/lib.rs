//! HTTP API layer for fieldline push notifications.
//!
//! This crate provides the REST surface:
//!
//! - **Endpoints**: device registration, relay invocation, dispatch,
//!   notification history, preferences
//! - **Extractors**: authenticated user
//! - **Middleware**: bearer JWT verification against the external
//!   identity provider
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};
