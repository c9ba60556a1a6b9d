//! Database entities.

pub mod app_notification;
pub mod device_registration;
pub mod notification_preferences;
pub mod user_push_state;
