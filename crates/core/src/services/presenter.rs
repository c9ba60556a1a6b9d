//! Notification presenter contract.
//!
//! Inbound push payloads arrive in more than one shape depending on how
//! the relay packed them: a structured `notification` block, a flat
//! `data` bag, or garbage. The shapes are modeled as an explicit union
//! with a deterministic priority, resolved once at the boundary, and an
//! unparseable payload still yields exactly one generic notification —
//! the user must know something happened even if its content is
//! unrecoverable.
//!
//! Also defined here: the click-routing decision for the background
//! handler and the page/worker message contract. The worker has no
//! access to the data layer; marking a notification clicked is delegated
//! to a running page context over this contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use fieldline_db::entities::app_notification::NotificationType;
use fieldline_db::entities::notification_preferences;

use crate::services::preferences::NotificationPreferencesService;

/// Structured notification block carried by some payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationBlock {
    /// Title, if present.
    pub title: Option<String>,
    /// Body, if present.
    pub body: Option<String>,
    /// Icon URL, if present.
    pub icon: Option<String>,
}

/// Known inbound payload shapes, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    /// A `notification` block, optionally with a data bag.
    Notification {
        /// The structured block.
        notification: NotificationBlock,
        /// Accompanying data entries.
        data: HashMap<String, String>,
    },
    /// A flat data-only message.
    Data {
        /// The data entries.
        data: HashMap<String, String>,
    },
    /// Unparseable; presented as a generic fallback.
    Opaque,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    notification: Option<NotificationBlock>,
    data: Option<HashMap<String, String>>,
}

/// Everything needed to show one OS notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayNotification {
    /// Title to render.
    pub title: String,
    /// Body to render.
    pub body: String,
    /// Icon URL, if any.
    pub icon: Option<String>,
    /// URL to open on click.
    pub action_url: Option<String>,
    /// Originating notification record, for read/clicked delegation.
    pub notification_id: Option<String>,
    /// Dedup tag.
    pub tag: Option<String>,
}

impl InboundPayload {
    /// Parse raw payload bytes into the highest-priority matching shape.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let Ok(payload) = serde_json::from_slice::<RawPayload>(raw) else {
            return Self::Opaque;
        };

        match (payload.notification, payload.data) {
            (Some(notification), data) => Self::Notification {
                notification,
                data: data.unwrap_or_default(),
            },
            (None, Some(data)) if !data.is_empty() => Self::Data { data },
            _ => Self::Opaque,
        }
    }

    /// Resolve the display form. The fallback chain runs once here:
    /// notification block first, then data entries, then app defaults.
    #[must_use]
    pub fn display(&self, app_name: &str, default_icon: Option<&str>) -> DisplayNotification {
        let (block, data) = match self {
            Self::Notification { notification, data } => (Some(notification), Some(data)),
            Self::Data { data } => (None, Some(data)),
            Self::Opaque => (None, None),
        };

        let field = |key: &str| data.and_then(|d| d.get(key)).cloned();

        let title = block
            .and_then(|b| b.title.clone())
            .or_else(|| field("title"))
            .unwrap_or_else(|| app_name.to_string());
        let body = block
            .and_then(|b| b.body.clone())
            .or_else(|| field("body"))
            .unwrap_or_else(|| "You have a new notification".to_string());
        let icon = block
            .and_then(|b| b.icon.clone())
            .or_else(|| field("icon"))
            .or_else(|| default_icon.map(String::from));
        let notification_id = field("notification_id");
        let action_url = field("action_url");
        let tag = field("tag").or_else(|| notification_id.clone());

        DisplayNotification {
            title,
            body,
            icon,
            action_url,
            notification_id,
            tag,
        }
    }

    /// Notification category carried in the data bag, when present.
    #[must_use]
    pub fn notification_type(&self) -> Option<NotificationType> {
        let data = match self {
            Self::Notification { data, .. } | Self::Data { data } => data,
            Self::Opaque => return None,
        };
        match data.get("type").map(String::as_str) {
            Some("TASK_ASSIGNED") => Some(NotificationType::TaskAssigned),
            Some("TASK_COMPLETED") => Some(NotificationType::TaskCompleted),
            Some("WORK_ORDER_STATUS") => Some(NotificationType::WorkOrderStatus),
            Some("FEEDBACK") => Some(NotificationType::Feedback),
            Some("SYSTEM_ANNOUNCEMENT") => Some(NotificationType::SystemAnnouncement),
            Some("ANNOUNCEMENT") => Some(NotificationType::Announcement),
            _ => None,
        }
    }
}

/// An open app window, as the background handler sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenWindow {
    /// Current URL of the window.
    pub url: String,
}

/// Click-routing decision for the background handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickRoute {
    /// Focus the window already showing the target URL.
    FocusExisting(usize),
    /// Focus this window and navigate it to the target.
    NavigateExisting(usize),
    /// No windows open; open a new one at the target.
    OpenNew,
}

/// Decide how a notification click reaches the target URL.
///
/// Prefers a window already at the target, then any open window
/// (navigated there), then a fresh window.
#[must_use]
pub fn resolve_click(windows: &[OpenWindow], target_url: &str) -> ClickRoute {
    if let Some(index) = windows.iter().position(|w| window_matches(&w.url, target_url)) {
        return ClickRoute::FocusExisting(index);
    }
    if windows.is_empty() {
        ClickRoute::OpenNew
    } else {
        ClickRoute::NavigateExisting(0)
    }
}

fn window_matches(window_url: &str, target: &str) -> bool {
    if window_url == target {
        return true;
    }
    // Targets are usually app-relative paths; match against the window's
    // path component.
    url::Url::parse(window_url).is_ok_and(|parsed| parsed.path() == target)
}

/// Page/worker message contract.
///
/// The worker delegates data-layer mutations to a page context; the page
/// can force a waiting worker to activate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Page to worker: skip the waiting phase and activate.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    /// Worker to page: mark this notification clicked.
    #[serde(rename = "NOTIFICATION_CLICKED")]
    NotificationClicked {
        /// The clicked notification record.
        #[serde(rename = "notificationId")]
        notification_id: String,
    },
}

/// Foreground presentation decision for an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundPresentation {
    /// Whether to show the in-app banner.
    pub show: bool,
    /// Whether to play the notification sound.
    pub play_sound: bool,
}

/// Decide whether and how to present a payload while the app is open.
#[must_use]
pub fn foreground_presentation(
    preferences: &notification_preferences::Model,
    payload: &InboundPayload,
    now: chrono::NaiveTime,
) -> ForegroundPresentation {
    let category_ok = payload
        .notification_type()
        .is_none_or(|ty| NotificationPreferencesService::category_enabled(preferences, &ty));

    let show = preferences.push_enabled
        && category_ok
        && !NotificationPreferencesService::in_quiet_hours(preferences, now);

    ForegroundPresentation {
        show,
        play_sound: show && preferences.sound_enabled,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn notification_block_takes_priority_over_data() {
        let raw = br#"{
            "notification": {"title": "Block title", "body": "Block body"},
            "data": {"title": "Data title", "notification_id": "n1"}
        }"#;
        let payload = InboundPayload::parse(raw);

        let display = payload.display("Fieldline", None);
        assert_eq!(display.title, "Block title");
        assert_eq!(display.body, "Block body");
        assert_eq!(display.notification_id.as_deref(), Some("n1"));
        assert_eq!(display.tag.as_deref(), Some("n1"));
    }

    #[test]
    fn flat_data_shape_is_second_priority() {
        let raw = br#"{"data": {"title": "Data title", "body": "Data body", "action_url": "/tasks/t1"}}"#;
        let payload = InboundPayload::parse(raw);

        assert!(matches!(payload, InboundPayload::Data { .. }));
        let display = payload.display("Fieldline", None);
        assert_eq!(display.title, "Data title");
        assert_eq!(display.action_url.as_deref(), Some("/tasks/t1"));
    }

    #[test]
    fn malformed_payload_still_displays_generic_fallback() {
        let payload = InboundPayload::parse(b"not json at all");
        assert_eq!(payload, InboundPayload::Opaque);

        // Exactly one displayable notification comes out of any input.
        let display = payload.display("Fieldline", Some("/icon.png"));
        assert_eq!(display.title, "Fieldline");
        assert_eq!(display.body, "You have a new notification");
        assert_eq!(display.icon.as_deref(), Some("/icon.png"));
        assert!(display.notification_id.is_none());
    }

    #[test]
    fn empty_object_is_opaque() {
        assert_eq!(InboundPayload::parse(b"{}"), InboundPayload::Opaque);
    }

    #[test]
    fn click_focuses_matching_window() {
        let windows = vec![
            OpenWindow {
                url: "https://app.example.com/dashboard".to_string(),
            },
            OpenWindow {
                url: "https://app.example.com/tasks/t1".to_string(),
            },
        ];
        assert_eq!(
            resolve_click(&windows, "/tasks/t1"),
            ClickRoute::FocusExisting(1)
        );
    }

    #[test]
    fn click_navigates_any_window_when_none_match() {
        let windows = vec![OpenWindow {
            url: "https://app.example.com/dashboard".to_string(),
        }];
        assert_eq!(
            resolve_click(&windows, "/tasks/t1"),
            ClickRoute::NavigateExisting(0)
        );
    }

    #[test]
    fn click_opens_new_window_when_none_open() {
        assert_eq!(resolve_click(&[], "/tasks/t1"), ClickRoute::OpenNew);
    }

    #[test]
    fn worker_message_wire_format() {
        let clicked = WorkerMessage::NotificationClicked {
            notification_id: "n1".to_string(),
        };
        let wire = serde_json::to_string(&clicked).unwrap();
        assert_eq!(
            wire,
            r#"{"type":"NOTIFICATION_CLICKED","notificationId":"n1"}"#
        );

        let skip: WorkerMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(skip, WorkerMessage::SkipWaiting);
    }

    #[test]
    fn foreground_presentation_honors_sound_and_master_toggle() {
        let mut prefs = notification_preferences::Model {
            user_id: "user1".to_string(),
            push_enabled: true,
            sound_enabled: false,
            task_assigned: true,
            task_completed: true,
            work_order_status: true,
            feedback: true,
            system_announcement: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
            created_at: chrono::Utc::now().into(),
            updated_at: None,
        };
        let payload = InboundPayload::parse(
            br#"{"notification": {"title": "t"}, "data": {"type": "TASK_ASSIGNED"}}"#,
        );
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();

        let decision = foreground_presentation(&prefs, &payload, noon);
        assert!(decision.show);
        assert!(!decision.play_sound);

        prefs.push_enabled = false;
        let decision = foreground_presentation(&prefs, &payload, noon);
        assert!(!decision.show);
    }
}
