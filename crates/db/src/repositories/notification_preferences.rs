//! Notification preferences repository.

use std::sync::Arc;

use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait};

use crate::entities::notification_preferences::{ActiveModel, Entity, Model};
use fieldline_common::{AppError, AppResult};

/// Repository for notification preference rows.
#[derive(Clone)]
pub struct NotificationPreferencesRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationPreferencesRepository {
    /// Create a new notification preferences repository.
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find preferences for a user.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Option<Model>> {
        Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a preference row.
    pub async fn create(&self, preferences: ActiveModel) -> AppResult<Model> {
        preferences
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a preference row.
    pub async fn update(&self, preferences: ActiveModel) -> AppResult<Model> {
        preferences
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn test_preferences(user_id: &str) -> Model {
        Model {
            user_id: user_id.to_string(),
            push_enabled: true,
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

    #[tokio::test]
    async fn test_find_by_user_found() {
        let preferences = test_preferences("user1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[preferences]])
                .into_connection(),
        );

        let repo = NotificationPreferencesRepository::new(db);
        let result = repo.find_by_user("user1").await.unwrap();

        assert!(result.is_some());
        assert!(result.unwrap().push_enabled);
    }

    #[tokio::test]
    async fn test_find_by_user_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<Model>::new()])
                .into_connection(),
        );

        let repo = NotificationPreferencesRepository::new(db);
        assert!(repo.find_by_user("user1").await.unwrap().is_none());
    }
}
