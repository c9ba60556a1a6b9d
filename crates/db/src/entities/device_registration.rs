//! Device registration entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Device platform for a push registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// iOS device
    #[sea_orm(string_value = "ios")]
    Ios,
    /// Android device
    #[sea_orm(string_value = "android")]
    Android,
    /// Desktop or mobile browser
    #[sea_orm(string_value = "web")]
    Web,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        };
        write!(f, "{s}")
    }
}

/// Push device registration entity.
///
/// One row per device endpoint token. Rows are deactivated, never deleted,
/// when the relay reports the token unregistered or the user disables
/// notifications on that device.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "device_registration")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning user ID
    #[sea_orm(indexed)]
    pub user_id: String,

    /// Opaque messaging token issued by the push platform
    #[sea_orm(column_type = "Text", unique)]
    pub token: String,

    /// Device platform
    pub device_type: DeviceType,

    /// Human-readable device label, best-effort detected
    #[sea_orm(nullable)]
    pub device_name: Option<String>,

    /// User agent the registration was made from
    #[sea_orm(nullable)]
    pub user_agent: Option<String>,

    /// Whether the app runs as an installed PWA on this device
    #[sea_orm(default_value = false)]
    pub is_pwa: bool,

    /// False once the platform reports the token invalid/unregistered
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    /// Last successful use or validation
    #[sea_orm(nullable)]
    pub last_used_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the registration was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the registration was last updated
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

/// Relations for device registration.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
