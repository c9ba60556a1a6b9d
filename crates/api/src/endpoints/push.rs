//! Push device registration and relay endpoints.

use std::collections::HashMap;

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use fieldline_common::AppResult;
use fieldline_core::{DeviceRegistrationResponse, RelayMessage};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Request to register a device token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    /// Messaging token acquired by the device.
    pub token: String,
    /// Whether the app runs as an installed PWA.
    #[serde(default)]
    pub is_pwa: bool,
}

/// Request to unregister a device token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterDeviceRequest {
    /// The token to deactivate.
    pub token: String,
}

/// Push availability response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfigResponse {
    /// Whether an outbound relay credential is configured.
    pub available: bool,
}

/// Single-token relay invocation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPushRequest {
    /// Recipient device token.
    pub fcm_token: String,
    /// Notification content.
    pub notification: SendPushNotification,
    /// Opaque data entries surfaced to the receiving handler.
    #[serde(default)]
    pub data: Option<HashMap<String, String>>,
}

/// Notification block of a relay invocation.
#[derive(Debug, Deserialize)]
pub struct SendPushNotification {
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Icon URL.
    pub icon: Option<String>,
}

/// Relay invocation response; mirrors the relay outcome per token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPushResponse {
    /// Whether the relay accepted the message.
    pub success: bool,
    /// Relay message ID on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Human-readable error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Whether the caller should deactivate the recipient token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_deactivate_token: Option<bool>,
}

/// Dispatch outcome response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    /// Whether at least one device delivery succeeded.
    pub push_sent: bool,
}

/// Register a device token for the authenticated user.
async fn register(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<RegisterDeviceRequest>,
) -> AppResult<ApiResponse<DeviceRegistrationResponse>> {
    // Extract user agent from headers
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let registration = state
        .registry
        .register_device(&user.id, &req.token, user_agent.as_deref(), req.is_pwa)
        .await?;

    Ok(ApiResponse::ok(registration))
}

/// Deactivate one of the caller's device tokens.
async fn unregister(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UnregisterDeviceRequest>,
) -> AppResult<ApiResponse<()>> {
    state.registry.unregister_token(&user.id, &req.token).await?;
    Ok(ApiResponse::ok(()))
}

/// List the caller's device registrations.
async fn devices(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<DeviceRegistrationResponse>>> {
    let registrations = state.registry.list_devices(&user.id).await?;
    Ok(ApiResponse::ok(registrations))
}

/// Push availability.
async fn get_config(State(state): State<AppState>) -> ApiResponse<PushConfigResponse> {
    ApiResponse::ok(PushConfigResponse {
        available: state.relay.is_some(),
    })
}

/// Invoke the relay for exactly one recipient token.
///
/// The response always carries the per-token outcome; a dead token is
/// reported with `shouldDeactivateToken` rather than surfaced as an HTTP
/// failure.
async fn send(
    State(state): State<AppState>,
    Json(req): Json<SendPushRequest>,
) -> Json<SendPushResponse> {
    let Some(relay) = &state.relay else {
        return Json(SendPushResponse {
            success: false,
            message_id: None,
            error: Some("Push relay not configured".to_string()),
            error_code: Some("RELAY_NOT_CONFIGURED".to_string()),
            should_deactivate_token: Some(false),
        });
    };

    let message = RelayMessage {
        token: req.fcm_token,
        title: req.notification.title,
        body: req.notification.body,
        icon: req.notification.icon,
        action_url: req.data.as_ref().and_then(|d| d.get("action_url").cloned()),
        tag: req
            .data
            .as_ref()
            .and_then(|d| d.get("notification_id").cloned()),
        data: req.data.unwrap_or_default(),
    };

    match relay.send(&message).await {
        Ok(receipt) => Json(SendPushResponse {
            success: true,
            message_id: Some(receipt.message_id),
            error: None,
            error_code: None,
            should_deactivate_token: None,
        }),
        Err(error) => Json(SendPushResponse {
            success: false,
            message_id: None,
            error_code: Some(error.error_code().to_string()),
            should_deactivate_token: Some(error.should_deactivate_token()),
            error: Some(error.to_string()),
        }),
    }
}

/// Dispatch a notification to a user (backend-invoked).
async fn dispatch(
    AuthUser(_caller): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<fieldline_core::DispatchInput>,
) -> AppResult<ApiResponse<DispatchResponse>> {
    let push_sent = state.dispatch.dispatch(input).await?;
    Ok(ApiResponse::ok(DispatchResponse { push_sent }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/devices", post(devices))
        .route("/config", post(get_config))
        .route("/send", post(send))
        .route("/dispatch", post(dispatch))
}
