//! Denormalized per-user push state entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::device_registration::DeviceType;

/// Per-user push convenience record.
///
/// The device_registration table is the authoritative token map; this row
/// mirrors the enablement flag and last-token fields the registry writes
/// for cheap reads.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_push_state")]
pub struct Model {
    /// Owning user ID
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,

    /// Whether any device of this user holds an active registration
    #[sea_orm(default_value = false)]
    pub notifications_enabled: bool,

    /// Most recently registered token
    #[sea_orm(column_type = "Text", nullable)]
    pub last_token: Option<String>,

    /// When the last token was written
    #[sea_orm(nullable)]
    pub last_token_updated_at: Option<DateTimeWithTimeZone>,

    /// Device type of the most recent registration
    #[sea_orm(nullable)]
    pub device_type: Option<DeviceType>,

    /// Whether the most recent registration came from an installed PWA
    #[sea_orm(default_value = false)]
    pub is_pwa: bool,

    /// Timestamp when the record was last updated
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

/// Relations for user push state.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
