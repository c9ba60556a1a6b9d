//! API middleware.

#![allow(missing_docs)]

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use serde::Deserialize;

use fieldline_common::AuthConfig;
use fieldline_core::{
    DeviceRegistryService, NotificationDispatchService, NotificationPreferencesService, PushRelay,
};
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: DeviceRegistryService,
    pub dispatch: NotificationDispatchService,
    pub preferences: NotificationPreferencesService,
    /// Direct relay handle for the single-token send endpoint. Absent
    /// when no push credential is configured.
    pub relay: Option<Arc<dyn PushRelay>>,
    pub auth: AuthConfig,
}

/// Claims in bearer tokens from the external identity provider. Only the
/// subject is consumed here.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// Subject: the user ID.
    pub sub: String,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// User ID from the verified token subject.
    pub id: String,
}

/// Authentication middleware.
///
/// Identity is delegated to an external provider; this only verifies the
/// bearer JWT signature and expiry, then exposes the subject.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
        && let Some(user) = verify_bearer(&state.auth, token)
    {
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}

fn verify_bearer(auth: &AuthConfig, token: &str) -> Option<AuthenticatedUser> {
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    if let Some(issuer) = &auth.issuer {
        validation.set_issuer(&[issuer]);
    }

    let key = jsonwebtoken::DecodingKey::from_secret(auth.jwt_secret.as_bytes());
    match jsonwebtoken::decode::<IdentityClaims>(token, &key, &validation) {
        Ok(data) => Some(AuthenticatedUser {
            id: data.claims.sub,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            None
        }
    }
}
