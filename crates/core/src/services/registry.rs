//! Device registry service.
//!
//! Owns the push token lifecycle on the client side of the system:
//! permission prompts, guarded token acquisition, the profile-local
//! cache, and the durable per-user registration records.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::Set;

use fieldline_common::{AppResult, IdGenerator, LocalStore, store_keys};
use fieldline_db::entities::device_registration;
use fieldline_db::repositories::{DeviceRegistrationRepository, UserPushStateRepository};

use crate::services::coordinator::RegistrationCoordinator;
use crate::services::platform::{DeviceInfo, PermissionState, PushPlatform};

/// Device registration wire response. The token itself never leaves the
/// service; only a short suffix for identification.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistrationResponse {
    /// Registration ID.
    pub id: String,
    /// Last characters of the token, for display.
    pub token_suffix: String,
    /// Device platform.
    pub device_type: device_registration::DeviceType,
    /// Human-readable device label.
    pub device_name: Option<String>,
    /// Whether the registration is active.
    pub is_active: bool,
    /// Last successful use or validation.
    pub last_used_at: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<device_registration::Model> for DeviceRegistrationResponse {
    fn from(model: device_registration::Model) -> Self {
        let suffix_start = model.token.len().saturating_sub(8);
        Self {
            id: model.id,
            token_suffix: model.token[suffix_start..].to_string(),
            device_type: model.device_type,
            device_name: model.device_name,
            is_active: model.is_active,
            last_used_at: model.last_used_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Device registry service.
#[derive(Clone)]
pub struct DeviceRegistryService {
    platform: Arc<dyn PushPlatform>,
    local: Arc<dyn LocalStore>,
    coordinator: RegistrationCoordinator,
    device_repo: DeviceRegistrationRepository,
    push_state_repo: UserPushStateRepository,
    id_gen: IdGenerator,
}

impl DeviceRegistryService {
    /// Create a new device registry service.
    #[must_use]
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        local: Arc<dyn LocalStore>,
        coordinator: RegistrationCoordinator,
        device_repo: DeviceRegistrationRepository,
        push_state_repo: UserPushStateRepository,
    ) -> Self {
        Self {
            platform,
            local,
            coordinator,
            device_repo,
            push_state_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Ask the platform for notification permission and, when granted,
    /// register a token.
    ///
    /// A refusal returns `false` with no side effects: no acquisition
    /// call is made and the durable record is untouched. Returns `true`
    /// only when a token was obtained and stored.
    pub async fn request_permission(
        &self,
        user_id: &str,
        user_agent: Option<&str>,
        is_pwa: bool,
    ) -> AppResult<bool> {
        match self.platform.request_permission().await? {
            PermissionState::Granted => {}
            state => {
                tracing::info!(?state, "Notification permission not granted");
                return Ok(false);
            }
        }

        Ok(self
            .register_token(user_id, user_agent, is_pwa)
            .await
            .is_some())
    }

    /// Acquire and store a messaging token under the coordinator guard.
    ///
    /// Returns `None` when the guard refuses the attempt, when no service
    /// worker is ready to receive deliveries, or when acquisition fails.
    /// Failures update the coordinator state machine rather than
    /// propagate.
    pub async fn register_token(
        &self,
        user_id: &str,
        user_agent: Option<&str>,
        is_pwa: bool,
    ) -> Option<String> {
        let attempt = Self::acquire_and_store(
            Arc::clone(&self.platform),
            Arc::clone(&self.local),
            self.device_repo.clone(),
            self.push_state_repo.clone(),
            self.id_gen.clone(),
            user_id.to_string(),
            user_agent.map(String::from),
            is_pwa,
        );
        self.coordinator.run(attempt).await
    }

    /// Best-effort re-registration for returning users.
    ///
    /// Runs only when platform permission is already granted (it never
    /// prompts) and is debounced by the coordinator's minimum interval.
    pub async fn auto_enable(
        &self,
        user_id: &str,
        user_agent: Option<&str>,
        is_pwa: bool,
    ) -> Option<String> {
        if self.platform.permission().await != PermissionState::Granted {
            return None;
        }
        if !self.coordinator.auto_enable_due().await {
            tracing::debug!("Auto-enable debounced");
            return None;
        }
        self.register_token(user_id, user_agent, is_pwa).await
    }

    /// Persist a token acquired by a remote client.
    ///
    /// The HTTP registration surface: the device already holds a token
    /// and reports it for durable storage. Same idempotent upsert as the
    /// embedded path, without touching this process's local cache.
    pub async fn register_device(
        &self,
        user_id: &str,
        token: &str,
        user_agent: Option<&str>,
        is_pwa: bool,
    ) -> AppResult<DeviceRegistrationResponse> {
        let info = DeviceInfo::detect(user_agent, is_pwa);
        let model = Self::persist_registration(
            &self.device_repo,
            &self.push_state_repo,
            &self.id_gen,
            user_id,
            token,
            &info,
            user_agent,
            is_pwa,
        )
        .await?;
        Ok(model.into())
    }

    /// List a user's device registrations, active and inactive.
    pub async fn list_devices(&self, user_id: &str) -> AppResult<Vec<DeviceRegistrationResponse>> {
        let registrations = self.device_repo.find_by_user(user_id).await?;
        Ok(registrations.into_iter().map(Into::into).collect())
    }

    /// Deactivate a token locally and in the durable record.
    ///
    /// Other registrations of the same user are never affected. Succeeds
    /// unless the durable write fails.
    pub async fn unregister_token(&self, user_id: &str, token: &str) -> AppResult<bool> {
        if self.local.get(store_keys::FCM_TOKEN).await?.as_deref() == Some(token) {
            self.local.remove(store_keys::FCM_TOKEN).await?;
        }

        match self.device_repo.find_by_token(token).await? {
            Some(registration) if registration.user_id == user_id => {
                self.device_repo.deactivate(token).await?;
            }
            Some(_) => {
                return Err(fieldline_common::AppError::Forbidden(
                    "Token is registered to another user".to_string(),
                ));
            }
            None => {}
        }

        let remaining = self.device_repo.count_active_by_user(user_id).await?;
        self.push_state_repo
            .set_enabled(user_id, remaining > 0)
            .await?;

        tracing::info!(user_id, remaining, "Device token unregistered");
        Ok(true)
    }

    /// Whether push looks enabled from this profile: a token is cached
    /// locally or platform permission is granted. A liveness hint, not a
    /// guarantee the token is still valid server-side.
    pub async fn is_enabled(&self) -> AppResult<bool> {
        if self.local.get(store_keys::FCM_TOKEN).await?.is_some() {
            return Ok(true);
        }
        Ok(self.platform.permission().await == PermissionState::Granted)
    }

    /// Best-effort device description for display and diagnostics.
    #[must_use]
    pub fn device_info(&self, user_agent: Option<&str>, is_pwa: bool) -> DeviceInfo {
        DeviceInfo::detect(user_agent, is_pwa)
    }

    /// Refresh `last_used_at` for the cached token on app foreground
    /// activation.
    pub async fn touch(&self, user_id: &str) -> AppResult<()> {
        let Some(token) = self.local.get(store_keys::FCM_TOKEN).await? else {
            return Ok(());
        };
        if let Some(registration) = self.device_repo.find_by_token(&token).await?
            && registration.user_id == user_id
            && registration.is_active
        {
            self.device_repo.mark_used(&token).await?;
        }
        Ok(())
    }

    /// The raw acquisition attempt run under the coordinator guard. Owned
    /// handles only: the attempt runs to completion even if every caller
    /// abandons interest.
    async fn acquire_and_store(
        platform: Arc<dyn PushPlatform>,
        local: Arc<dyn LocalStore>,
        device_repo: DeviceRegistrationRepository,
        push_state_repo: UserPushStateRepository,
        id_gen: IdGenerator,
        user_id: String,
        user_agent: Option<String>,
        is_pwa: bool,
    ) -> AppResult<Option<String>> {
        // The platform delivers pushes to a service worker; without one
        // registered there is nothing to acquire a token for.
        if !platform.service_worker_ready().await {
            tracing::warn!("No active service worker, skipping token acquisition");
            return Ok(None);
        }

        let Some(token) = platform.acquire_token().await? else {
            return Ok(None);
        };

        local.put(store_keys::FCM_TOKEN, &token).await?;
        if local.get(store_keys::DEVICE_ID).await?.is_none() {
            local
                .put(store_keys::DEVICE_ID, &id_gen.generate_device_id())
                .await?;
        }

        let info = DeviceInfo::detect(user_agent.as_deref(), is_pwa);
        Self::persist_registration(
            &device_repo,
            &push_state_repo,
            &id_gen,
            &user_id,
            &token,
            &info,
            user_agent.as_deref(),
            is_pwa,
        )
        .await?;

        local
            .put(store_keys::LAST_REGISTRATION, &Utc::now().to_rfc3339())
            .await?;

        Ok(Some(token))
    }

    /// Idempotent durable upsert: a token maps to at most one
    /// registration row. Re-registering refreshes and reactivates it; a
    /// token seen under a new user follows that user (one browser
    /// profile, one token identity).
    async fn persist_registration(
        device_repo: &DeviceRegistrationRepository,
        push_state_repo: &UserPushStateRepository,
        id_gen: &IdGenerator,
        user_id: &str,
        token: &str,
        info: &DeviceInfo,
        user_agent: Option<&str>,
        is_pwa: bool,
    ) -> AppResult<device_registration::Model> {
        let now = Utc::now();

        let model = match device_repo.find_by_token(token).await? {
            Some(existing) => {
                let mut active: device_registration::ActiveModel = existing.into();
                active.user_id = Set(user_id.to_string());
                active.device_type = Set(info.device_type);
                active.device_name = Set(Some(info.name.clone()));
                active.user_agent = Set(user_agent.map(String::from));
                active.is_pwa = Set(is_pwa);
                active.is_active = Set(true);
                active.last_used_at = Set(Some(now.into()));
                active.updated_at = Set(Some(now.into()));
                device_repo.update(active).await?
            }
            None => {
                let registration = device_registration::ActiveModel {
                    id: Set(id_gen.generate()),
                    user_id: Set(user_id.to_string()),
                    token: Set(token.to_string()),
                    device_type: Set(info.device_type),
                    device_name: Set(Some(info.name.clone())),
                    user_agent: Set(user_agent.map(String::from)),
                    is_pwa: Set(is_pwa),
                    is_active: Set(true),
                    last_used_at: Set(Some(now.into())),
                    created_at: Set(now.into()),
                    updated_at: Set(None),
                };
                device_repo.create(registration).await?
            }
        };

        push_state_repo
            .record_registration(user_id, token, info.device_type, is_pwa)
            .await?;

        tracing::info!(user_id = %user_id, device = %info.name, "Device token registered");
        Ok(model)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::coordinator::CoordinatorConfig;
    use fieldline_common::MemoryStore;
    use fieldline_db::entities::device_registration::DeviceType;
    use fieldline_db::entities::user_push_state;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockPlatform {
        permission: PermissionState,
        prompt_result: PermissionState,
        worker_ready: bool,
        token: Option<String>,
        acquisitions: AtomicUsize,
    }

    impl MockPlatform {
        fn granted(token: &str) -> Self {
            Self {
                permission: PermissionState::Granted,
                prompt_result: PermissionState::Granted,
                worker_ready: true,
                token: Some(token.to_string()),
                acquisitions: AtomicUsize::new(0),
            }
        }

        fn denied() -> Self {
            Self {
                permission: PermissionState::Denied,
                prompt_result: PermissionState::Denied,
                worker_ready: true,
                token: None,
                acquisitions: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl PushPlatform for MockPlatform {
        async fn permission(&self) -> PermissionState {
            self.permission
        }

        async fn request_permission(&self) -> AppResult<PermissionState> {
            Ok(self.prompt_result)
        }

        async fn service_worker_ready(&self) -> bool {
            self.worker_ready
        }

        async fn acquire_token(&self) -> AppResult<Option<String>> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            Ok(self.token.clone())
        }
    }

    fn registration_model(
        id: &str,
        user_id: &str,
        token: &str,
        active: bool,
    ) -> device_registration::Model {
        device_registration::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            token: token.to_string(),
            device_type: DeviceType::Web,
            device_name: Some("Chrome on Linux".to_string()),
            user_agent: None,
            is_pwa: false,
            is_active: active,
            last_used_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn push_state_model(user_id: &str) -> user_push_state::Model {
        user_push_state::Model {
            user_id: user_id.to_string(),
            notifications_enabled: true,
            last_token: Some("tok-a".to_string()),
            last_token_updated_at: None,
            device_type: Some(DeviceType::Web),
            is_pwa: false,
            updated_at: None,
        }
    }

    fn service(
        platform: Arc<MockPlatform>,
        db: Arc<sea_orm::DatabaseConnection>,
    ) -> DeviceRegistryService {
        let store = Arc::new(MemoryStore::new());
        let coordinator =
            RegistrationCoordinator::new(CoordinatorConfig::default(), Arc::clone(&store) as _);
        DeviceRegistryService::new(
            platform,
            store,
            coordinator,
            DeviceRegistrationRepository::new(Arc::clone(&db)),
            UserPushStateRepository::new(db),
        )
    }

    #[tokio::test]
    async fn denied_permission_has_no_side_effects() {
        let platform = Arc::new(MockPlatform::denied());
        // No queued results: any database call would fail the test.
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let registry = service(Arc::clone(&platform), db);

        let granted = registry
            .request_permission("user1", None, false)
            .await
            .unwrap();

        assert!(!granted);
        assert_eq!(platform.acquisitions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn register_fails_fast_without_service_worker() {
        let mut platform = MockPlatform::granted("tok-a");
        platform.worker_ready = false;
        let platform = Arc::new(platform);
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let registry = service(Arc::clone(&platform), db);

        let token = registry.register_token("user1", None, false).await;

        assert!(token.is_none());
        assert_eq!(platform.acquisitions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn register_new_token_persists_everywhere() {
        let platform = Arc::new(MockPlatform::granted("tok-a"));
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                // find_by_token: nothing yet
                .append_query_results([Vec::<device_registration::Model>::new()])
                // insert registration
                .append_query_results([[registration_model("r1", "user1", "tok-a", true)]])
                // push state lookup: nothing yet
                .append_query_results([Vec::<user_push_state::Model>::new()])
                // insert push state
                .append_query_results([[push_state_model("user1")]])
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                ])
                .into_connection(),
        );
        let registry = service(Arc::clone(&platform), db);

        let token = registry.register_token("user1", None, false).await;

        assert_eq!(token.as_deref(), Some("tok-a"));
        assert_eq!(platform.acquisitions.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry.local.get(store_keys::FCM_TOKEN).await.unwrap(),
            Some("tok-a".to_string())
        );
        assert!(
            registry
                .local
                .get(store_keys::DEVICE_ID)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn reregistering_same_token_is_an_upsert() {
        let platform = Arc::new(MockPlatform::granted("tok-a"));
        let existing = registration_model("r1", "user1", "tok-a", true);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                // find_by_token: already registered
                .append_query_results([[existing.clone()]])
                // update registration
                .append_query_results([[existing]])
                // push state lookup and update
                .append_query_results([[push_state_model("user1")]])
                .append_query_results([[push_state_model("user1")]])
                .into_connection(),
        );
        let registry = service(platform, db);

        let token = registry.register_token("user1", None, false).await;

        assert_eq!(token.as_deref(), Some("tok-a"));
    }

    #[tokio::test]
    async fn is_enabled_with_cached_token() {
        let platform = Arc::new(MockPlatform::denied());
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let registry = service(platform, db);

        registry
            .local
            .put(store_keys::FCM_TOKEN, "tok-a")
            .await
            .unwrap();

        assert!(registry.is_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn auto_enable_never_prompts_when_not_granted() {
        let platform = Arc::new(MockPlatform::denied());
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let registry = service(Arc::clone(&platform), db);

        let token = registry.auto_enable("user1", None, false).await;

        assert!(token.is_none());
        assert_eq!(platform.acquisitions.load(Ordering::SeqCst), 0);
    }
}
