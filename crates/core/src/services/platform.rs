//! Push platform seam.
//!
//! The messaging platform (permission prompts, token issuance, service
//! worker lifecycle) sits behind this trait so the registry and
//! coordinator can be exercised against scripted implementations.

use fieldline_common::AppResult;
use fieldline_db::entities::device_registration::DeviceType;
use serde::{Deserialize, Serialize};

/// Platform notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The user granted notification permission.
    Granted,
    /// The user refused; terminal for the session.
    Denied,
    /// Permission has not been decided yet.
    Prompt,
}

/// Push platform operations.
#[async_trait::async_trait]
pub trait PushPlatform: Send + Sync {
    /// Current permission state, without prompting.
    async fn permission(&self) -> PermissionState;

    /// Prompt the user for notification permission.
    async fn request_permission(&self) -> AppResult<PermissionState>;

    /// Whether a service worker is registered and active. Token
    /// acquisition requires one as the delivery target.
    async fn service_worker_ready(&self) -> bool;

    /// Acquire a messaging token. `None` means the platform issued no
    /// token without reporting a hard failure.
    async fn acquire_token(&self) -> AppResult<Option<String>>;
}

/// Platform stub for contexts with no messaging runtime (server
/// processes, tests of server-side flows). Never grants permission and
/// never issues tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPlatform;

#[async_trait::async_trait]
impl PushPlatform for UnsupportedPlatform {
    async fn permission(&self) -> PermissionState {
        PermissionState::Denied
    }

    async fn request_permission(&self) -> AppResult<PermissionState> {
        Ok(PermissionState::Denied)
    }

    async fn service_worker_ready(&self) -> bool {
        false
    }

    async fn acquire_token(&self) -> AppResult<Option<String>> {
        Ok(None)
    }
}

/// Best-effort device description, used for display and diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Detected device platform.
    pub device_type: DeviceType,
    /// Human-readable label, e.g. "Chrome on Linux".
    pub name: String,
    /// Whether the app runs as an installed PWA.
    pub is_pwa: bool,
}

impl DeviceInfo {
    /// Detect device info from a user-agent string and environment flags.
    #[must_use]
    pub fn detect(user_agent: Option<&str>, is_pwa: bool) -> Self {
        let ua = user_agent.unwrap_or_default();

        let device_type = if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
            DeviceType::Ios
        } else if ua.contains("Android") {
            DeviceType::Android
        } else {
            DeviceType::Web
        };

        let browser = if ua.contains("Edg/") {
            "Edge"
        } else if ua.contains("Chrome") {
            "Chrome"
        } else if ua.contains("Firefox") {
            "Firefox"
        } else if ua.contains("Safari") {
            "Safari"
        } else {
            "Browser"
        };

        let os = if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
            "iOS"
        } else if ua.contains("Android") {
            "Android"
        } else if ua.contains("Windows") {
            "Windows"
        } else if ua.contains("Mac OS") {
            "macOS"
        } else if ua.contains("Linux") {
            "Linux"
        } else {
            "Unknown"
        };

        Self {
            device_type,
            name: format!("{browser} on {os}"),
            is_pwa,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn detects_chrome_on_linux() {
        let info = DeviceInfo::detect(Some(CHROME_LINUX), false);
        assert_eq!(info.device_type, DeviceType::Web);
        assert_eq!(info.name, "Chrome on Linux");
    }

    #[test]
    fn detects_ios_device() {
        let info = DeviceInfo::detect(Some(SAFARI_IPHONE), true);
        assert_eq!(info.device_type, DeviceType::Ios);
        assert!(info.is_pwa);
    }

    #[test]
    fn missing_user_agent_falls_back_to_web() {
        let info = DeviceInfo::detect(None, false);
        assert_eq!(info.device_type, DeviceType::Web);
        assert_eq!(info.name, "Browser on Unknown");
    }
}
