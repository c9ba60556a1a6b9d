//! Business logic services.

#![allow(missing_docs)]

pub mod coordinator;
pub mod dispatch;
pub mod platform;
pub mod preferences;
pub mod presenter;
pub mod registry;
pub mod relay;

pub use coordinator::{
    CoordinatorConfig, CoordinatorPhase, CoordinatorState, RegistrationCoordinator,
};
pub use dispatch::{
    ActiveDeviceToken, DispatchInput, NotificationDispatchService, NotificationResponse,
};
pub use platform::{DeviceInfo, PermissionState, PushPlatform, UnsupportedPlatform};
pub use preferences::{NotificationPreferencesService, PreferencesResponse, UpdatePreferencesInput};
pub use presenter::{
    ClickRoute, DisplayNotification, ForegroundPresentation, InboundPayload, NotificationBlock,
    OpenWindow, WorkerMessage, foreground_presentation, resolve_click,
};
pub use registry::{DeviceRegistrationResponse, DeviceRegistryService};
pub use relay::{
    DisabledRelay, FcmRelayClient, PushRelay, RelayError, RelayMessage, RelayReceipt,
};
