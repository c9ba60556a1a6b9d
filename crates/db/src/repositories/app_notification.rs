//! App notification repository.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::entities::app_notification::{ActiveModel, Column, Entity, Model};
use fieldline_common::{AppError, AppResult};

/// Repository for in-app notification history.
#[derive(Clone)]
pub struct AppNotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl AppNotificationRepository {
    /// Create a new app notification repository.
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a notification by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Model>> {
        Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a notification by ID or return an error.
    pub async fn get_by_id(&self, id: &str) -> AppResult<Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {id} not found")))
    }

    /// Find notifications for a user, newest first.
    ///
    /// IDs are ULIDs, so `until_id` pagination rides the primary key
    /// ordering.
    pub async fn find_by_user(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<Model>> {
        let mut query = Entity::find().filter(Column::UserId.eq(user_id));

        if let Some(until) = until_id {
            query = query.filter(Column::Id.lt(until));
        }
        if unread_only {
            query = query.filter(Column::IsRead.eq(false));
        }

        query
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a notification row.
    pub async fn create(&self, notification: ActiveModel) -> AppResult<Model> {
        notification
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark a notification as read. Already-read rows are left as they
    /// are; the transition is monotonic.
    pub async fn mark_read(&self, id: &str) -> AppResult<Model> {
        let notification = self.get_by_id(id).await?;
        if notification.is_read {
            return Ok(notification);
        }

        let mut active: ActiveModel = notification.into();
        active.is_read = Set(true);
        active.read_at = Set(Some(Utc::now().into()));

        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark a notification as clicked. A clicked notification is
    /// implicitly read.
    pub async fn mark_clicked(&self, id: &str) -> AppResult<Model> {
        let notification = self.get_by_id(id).await?;
        if notification.is_clicked {
            return Ok(notification);
        }

        let was_read = notification.is_read;
        let mut active: ActiveModel = notification.into();
        active.is_clicked = Set(true);
        if !was_read {
            active.is_read = Set(true);
            active.read_at = Set(Some(Utc::now().into()));
        }

        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark all of a user's notifications as read.
    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        let result = Entity::update_many()
            .col_expr(Column::IsRead, Expr::value(true))
            .col_expr(Column::ReadAt, Expr::value(Utc::now()))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsRead.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Count unread notifications for a user.
    pub async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsRead.eq(false))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Purge notifications past their retention windows.
    ///
    /// Read rows expire `read_days` after being read; everything expires
    /// `max_days` after creation.
    pub async fn purge_expired(&self, read_days: u32, max_days: u32) -> AppResult<u64> {
        let now = Utc::now();
        let read_cutoff = now - Duration::days(i64::from(read_days));
        let max_cutoff = now - Duration::days(i64::from(max_days));

        let read_purged = Entity::delete_many()
            .filter(Column::IsRead.eq(true))
            .filter(Column::ReadAt.lt(read_cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let aged_purged = Entity::delete_many()
            .filter(Column::CreatedAt.lt(max_cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let purged = read_purged.rows_affected + aged_purged.rows_affected;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired notifications");
        }
        Ok(purged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::app_notification::NotificationType;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn test_notification(id: &str, user_id: &str, read: bool) -> Model {
        Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            notification_type: NotificationType::TaskAssigned,
            title: "New task".to_string(),
            body: "Inspect unit 7".to_string(),
            metadata: None,
            action_url: Some("/tasks/t1".to_string()),
            is_read: read,
            is_clicked: false,
            read_at: read.then(|| Utc::now().into()),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_user() {
        let n1 = test_notification("01a", "user1", false);
        let n2 = test_notification("01b", "user1", true);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[n2, n1]])
                .into_connection(),
        );

        let repo = AppNotificationRepository::new(db);
        let result = repo.find_by_user("user1", 10, None, false).await.unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_is_monotonic() {
        let already_read = test_notification("01a", "user1", true);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[already_read.clone()]])
                .into_connection(),
        );

        let repo = AppNotificationRepository::new(db);
        let result = repo.mark_read("01a").await.unwrap();

        // No update statement issued; the row is returned as-is.
        assert!(result.is_read);
        assert_eq!(result.read_at, already_read.read_at);
    }

    #[tokio::test]
    async fn test_mark_clicked_implies_read() {
        let unread = test_notification("01a", "user1", false);
        let mut clicked = unread.clone();
        clicked.is_clicked = true;
        clicked.is_read = true;
        clicked.read_at = Some(Utc::now().into());

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[unread]])
                .append_query_results([[clicked]])
                .into_connection(),
        );

        let repo = AppNotificationRepository::new(db);
        let result = repo.mark_clicked("01a").await.unwrap();

        assert!(result.is_clicked);
        assert!(result.is_read);
    }

    #[tokio::test]
    async fn test_purge_expired_sums_both_windows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 3,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 2,
                    },
                ])
                .into_connection(),
        );

        let repo = AppNotificationRepository::new(db);
        let purged = repo.purge_expired(30, 90).await.unwrap();

        assert_eq!(purged, 5);
    }
}
