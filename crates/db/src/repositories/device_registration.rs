//! Device registration repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::device_registration::{ActiveModel, Column, Entity, Model};
use fieldline_common::{AppError, AppResult};

/// Repository for device registration operations.
#[derive(Clone)]
pub struct DeviceRegistrationRepository {
    db: Arc<DatabaseConnection>,
}

impl DeviceRegistrationRepository {
    /// Create a new device registration repository.
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a registration by its token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<Model>> {
        Entity::find()
            .filter(Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a registration by token or return an error.
    pub async fn get_by_token(&self, token: &str) -> AppResult<Model> {
        self.find_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("Device registration not found".to_string()))
    }

    /// Find all registrations for a user, active or not.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the currently-active registrations for a user.
    pub async fn find_active_by_user(&self, user_id: &str) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsActive.eq(true))
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new registration.
    pub async fn create(&self, registration: ActiveModel) -> AppResult<Model> {
        registration
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a registration.
    pub async fn update(&self, registration: ActiveModel) -> AppResult<Model> {
        registration
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Deactivate a registration by token.
    ///
    /// Other registrations of the same user are untouched.
    pub async fn deactivate(&self, token: &str) -> AppResult<Model> {
        let registration = self.get_by_token(token).await?;
        let mut active: ActiveModel = registration.into();

        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now().into()));

        self.update(active).await
    }

    /// Refresh `last_used_at` after a successful delivery or validation.
    pub async fn mark_used(&self, token: &str) -> AppResult<Model> {
        let registration = self.get_by_token(token).await?;
        let mut active: ActiveModel = registration.into();

        active.last_used_at = Set(Some(Utc::now().into()));
        active.updated_at = Set(Some(Utc::now().into()));

        self.update(active).await
    }

    /// Count active registrations for a user.
    pub async fn count_active_by_user(&self, user_id: &str) -> AppResult<u64> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsActive.eq(true))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::device_registration::DeviceType;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn test_registration(id: &str, user_id: &str, token: &str, active: bool) -> Model {
        Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            token: token.to_string(),
            device_type: DeviceType::Web,
            device_name: Some("Chrome on Linux".to_string()),
            user_agent: None,
            is_pwa: false,
            is_active: active,
            last_used_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_token_found() {
        let registration = test_registration("r1", "user1", "tok-a", true);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[registration.clone()]])
                .into_connection(),
        );

        let repo = DeviceRegistrationRepository::new(db);
        let result = repo.find_by_token("tok-a").await.unwrap();

        assert!(result.is_some());
        assert_eq!(result.unwrap().token, "tok-a");
    }

    #[tokio::test]
    async fn test_find_by_token_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<Model>::new()])
                .into_connection(),
        );

        let repo = DeviceRegistrationRepository::new(db);
        let result = repo.find_by_token("missing").await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_by_token_missing_is_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<Model>::new()])
                .into_connection(),
        );

        let repo = DeviceRegistrationRepository::new(db);
        let err = repo.get_by_token("missing").await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_find_active_by_user() {
        let a = test_registration("r1", "user1", "tok-a", true);
        let b = test_registration("r2", "user1", "tok-b", true);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[a, b]])
                .into_connection(),
        );

        let repo = DeviceRegistrationRepository::new(db);
        let result = repo.find_active_by_user("user1").await.unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_deactivate_flips_active() {
        let registration = test_registration("r1", "user1", "tok-a", true);
        let mut deactivated = registration.clone();
        deactivated.is_active = false;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[registration]])
                .append_query_results([[deactivated]])
                .into_connection(),
        );

        let repo = DeviceRegistrationRepository::new(db);
        let result = repo.deactivate("tok-a").await.unwrap();

        assert!(!result.is_active);
    }
}
