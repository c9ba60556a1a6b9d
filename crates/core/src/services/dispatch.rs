//! Notification dispatch (delivery router).
//!
//! Resolves a logical recipient to their live device endpoints and fans a
//! payload out to each. The in-app history row is written before any
//! delivery decision, so the notification exists regardless of push
//! outcome. Fan-out is all-or-independent: every token gets its own relay
//! call and partial success is the expected common case.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use fieldline_common::{AppResult, IdGenerator};
use fieldline_db::entities::app_notification::{self, NotificationType};
use fieldline_db::entities::device_registration::DeviceType;
use fieldline_db::repositories::{AppNotificationRepository, DeviceRegistrationRepository};

use crate::services::preferences::NotificationPreferencesService;
use crate::services::relay::{PushRelay, RelayMessage};

/// A live device endpoint for a user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDeviceToken {
    /// Messaging token.
    pub token: String,
    /// Device platform.
    pub device_type: DeviceType,
    /// Human-readable device label.
    pub device_name: Option<String>,
}

/// Input for dispatching one notification to one user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchInput {
    /// Receiving user.
    pub user_id: String,
    /// Notification category.
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Title shown to the user.
    pub title: String,
    /// Body shown to the user.
    pub body: String,
    /// Opaque key/value payload.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// URL opened when the notification is clicked.
    #[serde(default)]
    pub action_url: Option<String>,
}

/// Notification wire response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    /// Notification ID.
    pub id: String,
    /// Notification category.
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Opaque key/value payload.
    pub metadata: Option<serde_json::Value>,
    /// URL opened on click.
    pub action_url: Option<String>,
    /// Read flag.
    pub read: bool,
    /// Clicked flag.
    pub clicked: bool,
    /// Created timestamp.
    pub created_at: String,
}

impl From<app_notification::Model> for NotificationResponse {
    fn from(model: app_notification::Model) -> Self {
        Self {
            id: model.id,
            notification_type: model.notification_type,
            title: model.title,
            body: model.body,
            metadata: model.metadata,
            action_url: model.action_url,
            read: model.is_read,
            clicked: model.is_clicked,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Delivery router.
#[derive(Clone)]
pub struct NotificationDispatchService {
    notification_repo: AppNotificationRepository,
    device_repo: DeviceRegistrationRepository,
    preferences: NotificationPreferencesService,
    relay: Arc<dyn PushRelay>,
    id_gen: IdGenerator,
}

impl NotificationDispatchService {
    /// Create a new dispatch service.
    #[must_use]
    pub fn new(
        notification_repo: AppNotificationRepository,
        device_repo: DeviceRegistrationRepository,
        preferences: NotificationPreferencesService,
        relay: Arc<dyn PushRelay>,
    ) -> Self {
        Self {
            notification_repo,
            device_repo,
            preferences,
            relay,
            id_gen: IdGenerator::new(),
        }
    }

    /// Resolve the currently-active device tokens for a user.
    pub async fn resolve_active_tokens(&self, user_id: &str) -> AppResult<Vec<ActiveDeviceToken>> {
        let registrations = self.device_repo.find_active_by_user(user_id).await?;
        Ok(registrations
            .into_iter()
            .map(|r| ActiveDeviceToken {
                token: r.token,
                device_type: r.device_type,
                device_name: r.device_name,
            })
            .collect())
    }

    /// Dispatch a notification to a user.
    ///
    /// Returns `true` when at least one device delivery succeeded. The
    /// in-app record exists in every case; `false` covers gated, no-device
    /// and all-failed outcomes.
    pub async fn dispatch(&self, input: DispatchInput) -> AppResult<bool> {
        // History first: the notification must exist even if push is
        // disabled or every endpoint is dead.
        let notification = self.record_notification(&input).await?;

        let preferences = self.preferences.get_or_create(&input.user_id).await?;
        if !preferences.push_enabled {
            tracing::debug!(user_id = %input.user_id, "Push disabled by master toggle");
            return Ok(false);
        }
        if !NotificationPreferencesService::category_enabled(
            &preferences,
            &input.notification_type,
        ) {
            tracing::debug!(
                user_id = %input.user_id,
                notification_type = ?input.notification_type,
                "Category disabled"
            );
            return Ok(false);
        }
        if NotificationPreferencesService::in_quiet_hours(
            &preferences,
            chrono::Local::now().time(),
        ) {
            tracing::debug!(user_id = %input.user_id, "Inside quiet hours");
            return Ok(false);
        }

        let targets = self.resolve_active_tokens(&input.user_id).await?;
        if targets.is_empty() {
            tracing::debug!(user_id = %input.user_id, "No active device tokens");
            return Ok(false);
        }

        let message_base = self.build_message(&input, &notification.id);
        let sends = targets.iter().map(|target| {
            let message = RelayMessage {
                token: target.token.clone(),
                ..message_base.clone()
            };
            async move { (target, self.relay.send(&message).await) }
        });
        let outcomes = futures::future::join_all(sends).await;

        let mut delivered = 0_usize;
        for (target, outcome) in outcomes {
            match outcome {
                Ok(receipt) => {
                    delivered += 1;
                    tracing::debug!(
                        message_id = %receipt.message_id,
                        device = ?target.device_name,
                        "Push delivered"
                    );
                    if let Err(e) = self.device_repo.mark_used(&target.token).await {
                        tracing::warn!(error = %e, "Failed to refresh token last_used_at");
                    }
                }
                Err(error) if error.should_deactivate_token() => {
                    tracing::info!(
                        device = ?target.device_name,
                        "Stale token reported by relay, deactivating"
                    );
                    if let Err(e) = self.device_repo.deactivate(&target.token).await {
                        tracing::warn!(error = %e, "Failed to deactivate stale token");
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        device = ?target.device_name,
                        "Push delivery failed"
                    );
                }
            }
        }

        Ok(delivered > 0)
    }

    /// Notification history for a user, newest first.
    pub async fn get_notifications(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<NotificationResponse>> {
        let notifications = self
            .notification_repo
            .find_by_user(user_id, limit, until_id, unread_only)
            .await?;
        Ok(notifications.into_iter().map(Into::into).collect())
    }

    /// Mark a notification as read, verifying ownership.
    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        if let Some(notification) = self.notification_repo.find_by_id(notification_id).await?
            && notification.user_id == user_id
        {
            self.notification_repo.mark_read(notification_id).await?;
        }
        Ok(())
    }

    /// Mark a notification as clicked (and implicitly read), verifying
    /// ownership. The service-worker click delegation lands here.
    pub async fn mark_clicked(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        if let Some(notification) = self.notification_repo.find_by_id(notification_id).await?
            && notification.user_id == user_id
        {
            self.notification_repo.mark_clicked(notification_id).await?;
        }
        Ok(())
    }

    /// Mark all of a user's notifications as read.
    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.mark_all_read(user_id).await
    }

    /// Count unread notifications for a user.
    pub async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.count_unread(user_id).await
    }

    /// Purge notifications past their retention windows.
    pub async fn purge_expired(&self, read_days: u32, max_days: u32) -> AppResult<u64> {
        self.notification_repo.purge_expired(read_days, max_days).await
    }

    async fn record_notification(
        &self,
        input: &DispatchInput,
    ) -> AppResult<app_notification::Model> {
        let model = app_notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(input.user_id.clone()),
            notification_type: Set(input.notification_type.clone()),
            title: Set(input.title.clone()),
            body: Set(input.body.clone()),
            metadata: Set(input.metadata.clone()),
            action_url: Set(input.action_url.clone()),
            is_read: Set(false),
            is_clicked: Set(false),
            read_at: Set(None),
            created_at: Set(Utc::now().into()),
        };
        self.notification_repo.create(model).await
    }

    fn build_message(&self, input: &DispatchInput, notification_id: &str) -> RelayMessage {
        let mut data = HashMap::new();
        data.insert("notification_id".to_string(), notification_id.to_string());
        if let Some(url) = &input.action_url {
            data.insert("action_url".to_string(), url.clone());
        }
        if let Some(metadata) = &input.metadata
            && let Some(map) = metadata.as_object()
        {
            for (key, value) in map {
                let rendered = value
                    .as_str()
                    .map_or_else(|| value.to_string(), String::from);
                data.insert(key.clone(), rendered);
            }
        }

        RelayMessage {
            token: String::new(),
            title: input.title.clone(),
            body: input.body.clone(),
            icon: None,
            action_url: input.action_url.clone(),
            tag: Some(notification_id.to_string()),
            data,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::relay::{RelayError, RelayReceipt};
    use fieldline_db::entities::notification_preferences;
    use fieldline_db::repositories::NotificationPreferencesRepository;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Relay scripted per token.
    struct ScriptedRelay {
        outcomes: Mutex<HashMap<String, Result<RelayReceipt, RelayError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedRelay {
        fn new(outcomes: HashMap<String, Result<RelayReceipt, RelayError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            })
        }

        fn empty() -> Arc<Self> {
            Self::new(HashMap::new())
        }
    }

    #[async_trait::async_trait]
    impl PushRelay for ScriptedRelay {
        async fn send(&self, message: &RelayMessage) -> Result<RelayReceipt, RelayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .await
                .remove(&message.token)
                .unwrap_or(Err(RelayError::Transient("unscripted token".to_string())))
        }
    }

    fn notification_model(id: &str, user_id: &str) -> app_notification::Model {
        app_notification::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            notification_type: NotificationType::TaskAssigned,
            title: "New task".to_string(),
            body: "Inspect unit 7".to_string(),
            metadata: None,
            action_url: Some("/tasks/t1".to_string()),
            is_read: false,
            is_clicked: false,
            read_at: None,
            created_at: Utc::now().into(),
        }
    }

    fn preferences_model(user_id: &str, push_enabled: bool) -> notification_preferences::Model {
        notification_preferences::Model {
            user_id: user_id.to_string(),
            push_enabled,
            sound_enabled: true,
            task_assigned: true,
            task_completed: true,
            work_order_status: true,
            feedback: true,
            system_announcement: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn registration_model(
        id: &str,
        user_id: &str,
        token: &str,
    ) -> fieldline_db::entities::device_registration::Model {
        fieldline_db::entities::device_registration::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            token: token.to_string(),
            device_type: DeviceType::Web,
            device_name: Some("Chrome on Linux".to_string()),
            user_agent: None,
            is_pwa: false,
            is_active: true,
            last_used_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service(
        db: Arc<sea_orm::DatabaseConnection>,
        relay: Arc<ScriptedRelay>,
    ) -> NotificationDispatchService {
        NotificationDispatchService::new(
            AppNotificationRepository::new(Arc::clone(&db)),
            DeviceRegistrationRepository::new(Arc::clone(&db)),
            NotificationPreferencesService::new(NotificationPreferencesRepository::new(db)),
            relay,
        )
    }

    fn input(user_id: &str) -> DispatchInput {
        DispatchInput {
            user_id: user_id.to_string(),
            notification_type: NotificationType::TaskAssigned,
            title: "New task".to_string(),
            body: "Inspect unit 7".to_string(),
            metadata: None,
            action_url: Some("/tasks/t1".to_string()),
        }
    }

    #[tokio::test]
    async fn master_toggle_off_records_history_but_sends_nothing() {
        let relay = ScriptedRelay::empty();
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                // insert app_notification
                .append_query_results([[notification_model("n1", "user1")]])
                // preferences lookup: master toggle off
                .append_query_results([[preferences_model("user1", false)]])
                .into_connection(),
        );
        let dispatch = service(db, Arc::clone(&relay));

        let sent = dispatch.dispatch(input("user1")).await.unwrap();

        assert!(!sent);
        assert_eq!(relay.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_active_tokens_returns_false() {
        let relay = ScriptedRelay::empty();
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[notification_model("n1", "user1")]])
                .append_query_results([[preferences_model("user1", true)]])
                // no active registrations
                .append_query_results([Vec::<
                    fieldline_db::entities::device_registration::Model,
                >::new()])
                .into_connection(),
        );
        let dispatch = service(db, Arc::clone(&relay));

        let sent = dispatch.dispatch(input("user1")).await.unwrap();

        assert!(!sent);
        assert_eq!(relay.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fan_out_is_independent_per_token() {
        // Token A unregistered, B delivered, C transient failure. The
        // dispatch still reports success and deactivates only A.
        let relay = ScriptedRelay::new(HashMap::from([
            ("tok-a".to_string(), Err(RelayError::Unregistered)),
            (
                "tok-b".to_string(),
                Ok(RelayReceipt {
                    message_id: "projects/p/messages/m1".to_string(),
                }),
            ),
            (
                "tok-c".to_string(),
                Err(RelayError::Transient("503".to_string())),
            ),
        ]));

        let reg_a = registration_model("r1", "user1", "tok-a");
        let reg_b = registration_model("r2", "user1", "tok-b");
        let reg_c = registration_model("r3", "user1", "tok-c");
        let mut deactivated_a = reg_a.clone();
        deactivated_a.is_active = false;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[notification_model("n1", "user1")]])
                .append_query_results([[preferences_model("user1", true)]])
                .append_query_results([[reg_a.clone(), reg_b.clone(), reg_c]])
                // outcome handling in target order:
                // A unregistered -> deactivate (select + update)
                .append_query_results([[reg_a]])
                .append_query_results([[deactivated_a]])
                // B delivered -> mark_used (select + update)
                .append_query_results([[reg_b.clone()]])
                .append_query_results([[reg_b]])
                // C transient -> nothing
                .into_connection(),
        );
        let dispatch = service(db, Arc::clone(&relay));

        let sent = dispatch.dispatch(input("user1")).await.unwrap();

        assert!(sent);
        assert_eq!(relay.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn message_carries_notification_id_and_action_url() {
        let relay = ScriptedRelay::empty();
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let dispatch = service(db, relay);

        let message = dispatch.build_message(&input("user1"), "n1");

        assert_eq!(message.data.get("notification_id").unwrap(), "n1");
        assert_eq!(message.data.get("action_url").unwrap(), "/tasks/t1");
        assert_eq!(message.tag.as_deref(), Some("n1"));
    }
}
