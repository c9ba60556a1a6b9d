//! Notification preferences service.

use chrono::{NaiveTime, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use fieldline_common::{AppError, AppResult};
use fieldline_db::entities::app_notification::NotificationType;
use fieldline_db::entities::notification_preferences::{self, ActiveModel, Model};
use fieldline_db::repositories::NotificationPreferencesRepository;

/// Input for updating notification preferences.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesInput {
    /// Master push toggle.
    pub push_enabled: Option<bool>,
    /// Sound toggle.
    pub sound_enabled: Option<bool>,
    /// Task assigned toggle.
    pub task_assigned: Option<bool>,
    /// Task completed toggle.
    pub task_completed: Option<bool>,
    /// Work-order status toggle.
    pub work_order_status: Option<bool>,
    /// Feedback toggle.
    pub feedback: Option<bool>,
    /// System announcement toggle.
    pub system_announcement: Option<bool>,
    /// Quiet hours start, "HH:MM".
    pub quiet_hours_start: Option<String>,
    /// Quiet hours end, "HH:MM".
    pub quiet_hours_end: Option<String>,
    /// Clear the quiet hours window.
    #[serde(default)]
    pub clear_quiet_hours: bool,
}

/// Preferences wire response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesResponse {
    /// Master push toggle.
    pub push_enabled: bool,
    /// Sound toggle.
    pub sound_enabled: bool,
    /// Task assigned toggle.
    pub task_assigned: bool,
    /// Task completed toggle.
    pub task_completed: bool,
    /// Work-order status toggle.
    pub work_order_status: bool,
    /// Feedback toggle.
    pub feedback: bool,
    /// System announcement toggle.
    pub system_announcement: bool,
    /// Quiet hours start.
    pub quiet_hours_start: Option<String>,
    /// Quiet hours end.
    pub quiet_hours_end: Option<String>,
}

impl From<Model> for PreferencesResponse {
    fn from(model: Model) -> Self {
        Self {
            push_enabled: model.push_enabled,
            sound_enabled: model.sound_enabled,
            task_assigned: model.task_assigned,
            task_completed: model.task_completed,
            work_order_status: model.work_order_status,
            feedback: model.feedback,
            system_announcement: model.system_announcement,
            quiet_hours_start: model.quiet_hours_start,
            quiet_hours_end: model.quiet_hours_end,
        }
    }
}

/// Notification preferences service.
#[derive(Clone)]
pub struct NotificationPreferencesService {
    repo: NotificationPreferencesRepository,
}

impl NotificationPreferencesService {
    /// Create a new preferences service.
    #[must_use]
    pub const fn new(repo: NotificationPreferencesRepository) -> Self {
        Self { repo }
    }

    /// Get a user's preferences, creating the default row on first
    /// interaction.
    pub async fn get_or_create(&self, user_id: &str) -> AppResult<Model> {
        if let Some(existing) = self.repo.find_by_user(user_id).await? {
            return Ok(existing);
        }

        let defaults = ActiveModel {
            user_id: Set(user_id.to_string()),
            push_enabled: Set(true),
            sound_enabled: Set(true),
            task_assigned: Set(true),
            task_completed: Set(true),
            work_order_status: Set(true),
            feedback: Set(true),
            system_announcement: Set(true),
            quiet_hours_start: Set(None),
            quiet_hours_end: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };
        self.repo.create(defaults).await
    }

    /// Update a user's preferences.
    pub async fn update(&self, user_id: &str, input: UpdatePreferencesInput) -> AppResult<Model> {
        let current = self.get_or_create(user_id).await?;

        let mut quiet_start = current.quiet_hours_start.clone();
        let mut quiet_end = current.quiet_hours_end.clone();
        if input.clear_quiet_hours {
            quiet_start = None;
            quiet_end = None;
        }
        if let Some(start) = input.quiet_hours_start {
            parse_time_of_day(&start)?;
            quiet_start = Some(start);
        }
        if let Some(end) = input.quiet_hours_end {
            parse_time_of_day(&end)?;
            quiet_end = Some(end);
        }
        if quiet_start.is_some() != quiet_end.is_some() {
            return Err(AppError::Validation(
                "Quiet hours require both start and end".to_string(),
            ));
        }

        let mut active: ActiveModel = current.into();
        if let Some(value) = input.push_enabled {
            active.push_enabled = Set(value);
        }
        if let Some(value) = input.sound_enabled {
            active.sound_enabled = Set(value);
        }
        if let Some(value) = input.task_assigned {
            active.task_assigned = Set(value);
        }
        if let Some(value) = input.task_completed {
            active.task_completed = Set(value);
        }
        if let Some(value) = input.work_order_status {
            active.work_order_status = Set(value);
        }
        if let Some(value) = input.system_announcement {
            active.system_announcement = Set(value);
        }
        if let Some(value) = input.feedback {
            active.feedback = Set(value);
        }
        active.quiet_hours_start = Set(quiet_start);
        active.quiet_hours_end = Set(quiet_end);
        active.updated_at = Set(Some(Utc::now().into()));

        self.repo.update(active).await
    }

    /// Whether this category is enabled for the user. The generic
    /// announcement type is gated only by the master toggle.
    #[must_use]
    pub const fn category_enabled(
        preferences: &notification_preferences::Model,
        notification_type: &NotificationType,
    ) -> bool {
        match notification_type {
            NotificationType::TaskAssigned => preferences.task_assigned,
            NotificationType::TaskCompleted => preferences.task_completed,
            NotificationType::WorkOrderStatus => preferences.work_order_status,
            NotificationType::Feedback => preferences.feedback,
            NotificationType::SystemAnnouncement => preferences.system_announcement,
            NotificationType::Announcement => true,
        }
    }

    /// Whether `now` falls inside the user's quiet hours window.
    /// Wrap-around windows ("22:00" to "07:00") are supported.
    #[must_use]
    pub fn in_quiet_hours(preferences: &notification_preferences::Model, now: NaiveTime) -> bool {
        let (Some(start), Some(end)) = (
            preferences
                .quiet_hours_start
                .as_deref()
                .and_then(|s| parse_time_of_day(s).ok()),
            preferences
                .quiet_hours_end
                .as_deref()
                .and_then(|s| parse_time_of_day(s).ok()),
        ) else {
            return false;
        };

        if start <= end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }
}

fn parse_time_of_day(value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| AppError::Validation(format!("Invalid time of day: {value}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn model_with_quiet_hours(start: Option<&str>, end: Option<&str>) -> Model {
        Model {
            user_id: "user1".to_string(),
            push_enabled: true,
            sound_enabled: true,
            task_assigned: true,
            task_completed: false,
            work_order_status: true,
            feedback: true,
            system_announcement: true,
            quiet_hours_start: start.map(String::from),
            quiet_hours_end: end.map(String::from),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn time(value: &str) -> NaiveTime {
        NaiveTime::parse_from_str(value, "%H:%M").unwrap()
    }

    #[test]
    fn category_gating_follows_toggles() {
        let prefs = model_with_quiet_hours(None, None);
        assert!(NotificationPreferencesService::category_enabled(
            &prefs,
            &NotificationType::TaskAssigned
        ));
        assert!(!NotificationPreferencesService::category_enabled(
            &prefs,
            &NotificationType::TaskCompleted
        ));
        // Generic announcements ride the master toggle only.
        assert!(NotificationPreferencesService::category_enabled(
            &prefs,
            &NotificationType::Announcement
        ));
    }

    #[test]
    fn no_quiet_hours_means_never_quiet() {
        let prefs = model_with_quiet_hours(None, None);
        assert!(!NotificationPreferencesService::in_quiet_hours(
            &prefs,
            time("03:00")
        ));
    }

    #[test]
    fn quiet_hours_plain_window() {
        let prefs = model_with_quiet_hours(Some("12:00"), Some("14:00"));
        assert!(NotificationPreferencesService::in_quiet_hours(
            &prefs,
            time("13:00")
        ));
        assert!(!NotificationPreferencesService::in_quiet_hours(
            &prefs,
            time("15:00")
        ));
    }

    #[test]
    fn quiet_hours_wrap_midnight() {
        let prefs = model_with_quiet_hours(Some("22:00"), Some("07:00"));
        assert!(NotificationPreferencesService::in_quiet_hours(
            &prefs,
            time("23:30")
        ));
        assert!(NotificationPreferencesService::in_quiet_hours(
            &prefs,
            time("03:00")
        ));
        assert!(!NotificationPreferencesService::in_quiet_hours(
            &prefs,
            time("12:00")
        ));
    }

    #[test]
    fn time_of_day_validation() {
        assert!(parse_time_of_day("07:30").is_ok());
        assert!(parse_time_of_day("7:30").is_ok());
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("night").is_err());
    }
}
