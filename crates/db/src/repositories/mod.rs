//! Database repositories.

mod app_notification;
mod device_registration;
mod notification_preferences;
mod user_push_state;

pub use app_notification::AppNotificationRepository;
pub use device_registration::DeviceRegistrationRepository;
pub use notification_preferences::NotificationPreferencesRepository;
pub use user_push_state::UserPushStateRepository;
