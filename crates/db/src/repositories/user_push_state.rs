//! User push state repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::entities::device_registration::DeviceType;
use crate::entities::user_push_state::{ActiveModel, Entity, Model};
use fieldline_common::{AppError, AppResult};

/// Repository for the denormalized per-user push record.
#[derive(Clone)]
pub struct UserPushStateRepository {
    db: Arc<DatabaseConnection>,
}

impl UserPushStateRepository {
    /// Create a new user push state repository.
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the push state for a user.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Option<Model>> {
        Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Record a successful registration: enablement flag, last token and
    /// device fields.
    pub async fn record_registration(
        &self,
        user_id: &str,
        token: &str,
        device_type: DeviceType,
        is_pwa: bool,
    ) -> AppResult<Model> {
        let now = Utc::now();

        match self.find_by_user(user_id).await? {
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.notifications_enabled = Set(true);
                active.last_token = Set(Some(token.to_string()));
                active.last_token_updated_at = Set(Some(now.into()));
                active.device_type = Set(Some(device_type));
                active.is_pwa = Set(is_pwa);
                active.updated_at = Set(Some(now.into()));

                active
                    .update(self.db.as_ref())
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))
            }
            None => {
                let state = ActiveModel {
                    user_id: Set(user_id.to_string()),
                    notifications_enabled: Set(true),
                    last_token: Set(Some(token.to_string())),
                    last_token_updated_at: Set(Some(now.into())),
                    device_type: Set(Some(device_type)),
                    is_pwa: Set(is_pwa),
                    updated_at: Set(Some(now.into())),
                };

                state
                    .insert(self.db.as_ref())
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))
            }
        }
    }

    /// Update the enablement flag after registrations change.
    ///
    /// No-op when the user has no push state row yet; a denied permission
    /// request must leave the record untouched.
    pub async fn set_enabled(&self, user_id: &str, enabled: bool) -> AppResult<Option<Model>> {
        let Some(existing) = self.find_by_user(user_id).await? else {
            return Ok(None);
        };

        let mut active: ActiveModel = existing.into();
        active.notifications_enabled = Set(enabled);
        active.updated_at = Set(Some(Utc::now().into()));

        active
            .update(self.db.as_ref())
            .await
            .map(Some)
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
