//! Outbound push relay client (FCM HTTP v1).
//!
//! The relay authenticates with a signed, time-boxed service credential:
//! an RS256 JWT assertion exchanged at the OAuth token URI for a
//! short-lived bearer token. The bearer is cached and reused until it is
//! within a safety margin of expiry. One relay call carries exactly one
//! recipient token; fan-out belongs to the dispatch service.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use fieldline_common::{AppError, AppResult, PushConfig};

/// Seconds a bearer token is considered stale before its actual expiry.
const BEARER_EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth scope for the messaging API.
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Relay delivery failure classes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The platform no longer knows this token. Expected steady-state:
    /// users revoke permission, clear data, uninstall. The caller must
    /// deactivate the token; it is never retried.
    #[error("Token is unregistered")]
    Unregistered,

    /// The relay rejected our credential. The cached bearer is discarded
    /// so the next attempt regenerates it.
    #[error("Relay authentication failed: {0}")]
    Auth(String),

    /// Anything else: network blips, 5xx, malformed responses.
    #[error("Transient relay failure: {0}")]
    Transient(String),
}

impl RelayError {
    /// Whether the caller should deactivate the recipient token.
    #[must_use]
    pub const fn should_deactivate_token(&self) -> bool {
        matches!(self, Self::Unregistered)
    }

    /// Stable error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unregistered => "UNREGISTERED",
            Self::Auth(_) => "RELAY_AUTH_FAILED",
            Self::Transient(_) => "RELAY_UNAVAILABLE",
        }
    }
}

/// Successful relay delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    /// Relay-assigned message identifier.
    pub message_id: String,
}

/// One outbound push message for one recipient token.
#[derive(Debug, Clone, Default)]
pub struct RelayMessage {
    /// Recipient device token.
    pub token: String,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Icon URL for platforms that render one.
    pub icon: Option<String>,
    /// URL opened on click.
    pub action_url: Option<String>,
    /// Dedup/collapse key.
    pub tag: Option<String>,
    /// Opaque string payload surfaced to the receiving handler.
    pub data: HashMap<String, String>,
}

/// Relay seam; the dispatch service fans out through this.
#[async_trait::async_trait]
pub trait PushRelay: Send + Sync {
    /// Deliver one message to one token.
    async fn send(&self, message: &RelayMessage) -> Result<RelayReceipt, RelayError>;
}

/// Relay used when no push credential is configured. Every send fails
/// transiently; dispatch still records history rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRelay;

#[async_trait::async_trait]
impl PushRelay for DisabledRelay {
    async fn send(&self, _message: &RelayMessage) -> Result<RelayReceipt, RelayError> {
        Err(RelayError::Transient("Push relay disabled".to_string()))
    }
}

#[derive(Debug, Clone)]
struct CachedBearer {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedBearer {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(BEARER_EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// FCM HTTP v1 relay client.
pub struct FcmRelayClient {
    config: PushConfig,
    encoding_key: jsonwebtoken::EncodingKey,
    http: reqwest::Client,
    bearer: Mutex<Option<CachedBearer>>,
}

impl FcmRelayClient {
    /// Create a relay client from the push configuration.
    ///
    /// Fails with a credential error when the service account key is
    /// malformed; that class is fatal for registration flows.
    pub fn new(config: PushConfig) -> AppResult<Arc<Self>> {
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(config.private_key.as_bytes())
            .map_err(|e| AppError::Credential(format!("Malformed service account key: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Arc::new(Self {
            config,
            encoding_key,
            http,
            bearer: Mutex::new(None),
        }))
    }

    fn endpoint(&self) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.config.project_id
        )
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, RelayError> {
        let claims = AssertionClaims {
            iss: &self.config.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.config.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| RelayError::Auth(format!("Failed to sign assertion: {e}")))
    }

    async fn bearer_token(&self) -> Result<String, RelayError> {
        let now = Utc::now();
        {
            let cached = self.bearer.lock().await;
            if let Some(bearer) = cached.as_ref()
                && bearer.is_fresh(now)
            {
                return Ok(bearer.token.clone());
            }
        }

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.config.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .send()
            .await
            .map_err(|e| RelayError::Transient(format!("Token exchange failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Auth(format!(
                "Token exchange rejected ({status}): {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Transient(format!("Malformed token response: {e}")))?;

        let bearer = CachedBearer {
            token: token.access_token.clone(),
            expires_at: now + Duration::seconds(token.expires_in),
        };
        *self.bearer.lock().await = Some(bearer);
        tracing::debug!("Refreshed relay bearer token");

        Ok(token.access_token)
    }

    async fn discard_bearer(&self) {
        *self.bearer.lock().await = None;
    }

    fn build_payload(&self, message: &RelayMessage) -> serde_json::Value {
        let icon = message
            .icon
            .clone()
            .or_else(|| self.config.default_icon.clone());

        let mut webpush_notification = json!({});
        if let Some(icon) = &icon {
            webpush_notification["icon"] = json!(icon);
        }
        if let Some(tag) = &message.tag {
            webpush_notification["tag"] = json!(tag);
        }

        let mut payload = json!({
            "message": {
                "token": message.token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": message.data,
                "webpush": {
                    "notification": webpush_notification,
                },
                "android": {
                    "notification": {
                        "click_action": message.action_url.clone().unwrap_or_else(|| "/".to_string()),
                        "tag": message.tag,
                    },
                },
                "apns": {
                    "payload": {
                        "aps": {
                            "content-available": 1,
                        },
                    },
                },
            }
        });

        if let Some(url) = &message.action_url {
            payload["message"]["webpush"]["fcm_options"] = json!({ "link": url });
        }

        payload
    }
}

/// Classify a relay rejection by status and response body.
fn classify_rejection(status: u16, body: &str) -> RelayError {
    match status {
        404 => RelayError::Unregistered,
        401 | 403 => RelayError::Auth(format!("Relay rejected credential ({status}): {body}")),
        400 if body.contains("UNREGISTERED")
            || body.contains("NOT_FOUND")
            || body.contains("INVALID_ARGUMENT") =>
        {
            // Invalid-token class: the registration is dead.
            RelayError::Unregistered
        }
        _ => RelayError::Transient(format!("Relay error ({status}): {body}")),
    }
}

#[async_trait::async_trait]
impl PushRelay for FcmRelayClient {
    async fn send(&self, message: &RelayMessage) -> Result<RelayReceipt, RelayError> {
        let bearer = self.bearer_token().await?;
        let payload = self.build_payload(message);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(bearer)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::Transient(format!("Relay request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            #[derive(Deserialize)]
            struct SendResponse {
                name: String,
            }
            let sent: SendResponse = response
                .json()
                .await
                .map_err(|e| RelayError::Transient(format!("Malformed relay response: {e}")))?;
            return Ok(RelayReceipt {
                message_id: sent.name,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_rejection(status.as_u16(), &body);
        if matches!(error, RelayError::Auth(_)) {
            self.discard_bearer().await;
        }
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_means_unregistered() {
        let error = classify_rejection(404, "");
        assert_eq!(error, RelayError::Unregistered);
        assert!(error.should_deactivate_token());
    }

    #[test]
    fn invalid_token_argument_means_unregistered() {
        let body = r#"{"error":{"status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(classify_rejection(400, body), RelayError::Unregistered);
    }

    #[test]
    fn unauthorized_is_auth_failure() {
        let error = classify_rejection(401, "expired");
        assert!(matches!(error, RelayError::Auth(_)));
        assert!(!error.should_deactivate_token());
    }

    #[test]
    fn server_errors_are_transient() {
        let error = classify_rejection(503, "unavailable");
        assert!(matches!(error, RelayError::Transient(_)));
        assert!(!error.should_deactivate_token());
    }

    #[test]
    fn bearer_freshness_honors_expiry_margin() {
        let now = Utc::now();
        let bearer = CachedBearer {
            token: "b".to_string(),
            expires_at: now + Duration::seconds(3600),
        };
        assert!(bearer.is_fresh(now));
        // Inside the safety margin the bearer counts as stale.
        assert!(!bearer.is_fresh(now + Duration::seconds(3545)));
        assert!(!bearer.is_fresh(now + Duration::seconds(3700)));
    }
}
