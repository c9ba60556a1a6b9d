//! Notification preference endpoints.

use axum::{Json, Router, extract::State, routing::post};

use fieldline_common::AppResult;
use fieldline_core::{PreferencesResponse, UpdatePreferencesInput};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Get the caller's preferences, creating defaults on first use.
async fn get(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<PreferencesResponse>> {
    let preferences = state.preferences.get_or_create(&user.id).await?;
    Ok(ApiResponse::ok(preferences.into()))
}

/// Update the caller's preferences.
async fn update(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<UpdatePreferencesInput>,
) -> AppResult<ApiResponse<PreferencesResponse>> {
    let preferences = state.preferences.update(&user.id, input).await?;
    Ok(ApiResponse::ok(preferences.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/get", post(get))
        .route("/update", post(update))
}
