//! API endpoints.

use axum::Router;

use crate::middleware::AppState;

pub mod notifications;
pub mod preferences;
pub mod push;

/// Assemble the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/push", push::router())
        .nest("/notifications", notifications::router())
        .nest("/notifications/preferences", preferences::router())
}
