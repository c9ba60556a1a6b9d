//! Notification preferences entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-user notification preferences.
///
/// Created with defaults on first notification-related interaction; never
/// deleted while the user account exists.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_preferences")]
pub struct Model {
    /// Owning user ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,

    /// Master push toggle; gates all outbound push delivery
    #[sea_orm(default_value = true)]
    pub push_enabled: bool,

    /// Whether foreground notifications play a sound
    #[sea_orm(default_value = true)]
    pub sound_enabled: bool,

    /// Task assigned notifications
    #[sea_orm(default_value = true)]
    pub task_assigned: bool,

    /// Task completed notifications
    #[sea_orm(default_value = true)]
    pub task_completed: bool,

    /// Work-order status change notifications
    #[sea_orm(default_value = true)]
    pub work_order_status: bool,

    /// Feedback notifications
    #[sea_orm(default_value = true)]
    pub feedback: bool,

    /// System announcement notifications
    #[sea_orm(default_value = true)]
    pub system_announcement: bool,

    /// Quiet hours start, local time of day as "HH:MM"
    #[sea_orm(nullable)]
    pub quiet_hours_start: Option<String>,

    /// Quiet hours end, local time of day as "HH:MM"
    #[sea_orm(nullable)]
    pub quiet_hours_end: Option<String>,

    /// Timestamp when the record was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the record was last updated
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

/// Relations for notification preferences.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
