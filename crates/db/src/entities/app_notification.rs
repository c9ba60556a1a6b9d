//! App notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification categories.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A task was assigned to the user
    #[sea_orm(string_value = "TASK_ASSIGNED")]
    TaskAssigned,
    /// A task owned by the user was completed
    #[sea_orm(string_value = "TASK_COMPLETED")]
    TaskCompleted,
    /// A work order changed status
    #[sea_orm(string_value = "WORK_ORDER_STATUS")]
    WorkOrderStatus,
    /// Feedback was left for the user
    #[sea_orm(string_value = "FEEDBACK")]
    Feedback,
    /// A system-wide announcement
    #[sea_orm(string_value = "SYSTEM_ANNOUNCEMENT")]
    SystemAnnouncement,
    /// Generic announcement, gated only by the master toggle
    #[sea_orm(string_value = "ANNOUNCEMENT")]
    Announcement,
}

/// In-app notification record.
///
/// One row per dispatched notification, created regardless of push
/// delivery outcome. `is_read` and `is_clicked` transition monotonically
/// false to true.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "app_notification")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Receiving user ID
    #[sea_orm(indexed)]
    pub user_id: String,

    /// Notification category
    pub notification_type: NotificationType,

    /// Title shown to the user
    pub title: String,

    /// Body shown to the user
    #[sea_orm(column_type = "Text")]
    pub body: String,

    /// Opaque key/value payload
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,

    /// URL opened when the notification is clicked
    #[sea_orm(nullable)]
    pub action_url: Option<String>,

    /// Has this notification been read?
    #[sea_orm(default_value = false)]
    pub is_read: bool,

    /// Has this notification been clicked?
    #[sea_orm(default_value = false)]
    pub is_clicked: bool,

    /// When the notification was read; drives the read-retention window
    #[sea_orm(nullable)]
    pub read_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the notification was created
    pub created_at: DateTimeWithTimeZone,
}

/// Relations for app notification.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
