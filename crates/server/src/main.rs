//! Fieldline push server entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use fieldline_api::{middleware::AppState, router as api_router};
use fieldline_common::{Config, FileStore, LocalStore};
use fieldline_core::{
    CoordinatorConfig, DeviceRegistryService, DisabledRelay, FcmRelayClient,
    NotificationDispatchService, NotificationPreferencesService, PushRelay,
    RegistrationCoordinator, UnsupportedPlatform,
};
use fieldline_db::repositories::{
    AppNotificationRepository, DeviceRegistrationRepository, NotificationPreferencesRepository,
    UserPushStateRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldline=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting fieldline push server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database and run migrations
    let db = fieldline_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    fieldline_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let device_repo = DeviceRegistrationRepository::new(Arc::clone(&db));
    let push_state_repo = UserPushStateRepository::new(Arc::clone(&db));
    let preferences_repo = NotificationPreferencesRepository::new(Arc::clone(&db));
    let notification_repo = AppNotificationRepository::new(Arc::clone(&db));

    // Initialize the outbound relay (optional, based on config)
    let relay: Option<Arc<dyn PushRelay>> = match &config.push {
        Some(push_config) => {
            let client = FcmRelayClient::new(push_config.clone())?;
            info!(project_id = %push_config.project_id, "Push relay configured");
            Some(client)
        }
        None => {
            info!("No push credential configured, relay disabled");
            None
        }
    };

    // Registration coordinator state persists across restarts
    let local_store: Arc<dyn LocalStore> =
        Arc::new(FileStore::new(PathBuf::from("data/local-store.json")));
    let coordinator = RegistrationCoordinator::restore(
        CoordinatorConfig::from(&config.coordinator),
        Arc::clone(&local_store),
    )
    .await;

    // Initialize services. Server processes carry no messaging runtime;
    // devices acquire tokens themselves and report them over HTTP.
    let registry = DeviceRegistryService::new(
        Arc::new(UnsupportedPlatform),
        local_store,
        coordinator,
        device_repo.clone(),
        push_state_repo,
    );
    let preferences = NotificationPreferencesService::new(preferences_repo);
    let dispatch = match &relay {
        Some(relay) => NotificationDispatchService::new(
            notification_repo.clone(),
            device_repo,
            preferences.clone(),
            Arc::clone(relay),
        ),
        None => NotificationDispatchService::new(
            notification_repo.clone(),
            device_repo,
            preferences.clone(),
            Arc::new(DisabledRelay),
        ),
    };

    // Create app state
    let state = AppState {
        registry,
        dispatch: dispatch.clone(),
        preferences,
        relay,
        auth: config.auth.clone(),
    };

    // Retention scheduler: purge read notifications after the read
    // window, everything after the maximum window.
    let retention = config.retention.clone();
    let purge_dispatch = dispatch;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(retention.purge_interval_secs));
        loop {
            interval.tick().await;
            match purge_dispatch
                .purge_expired(retention.read_days, retention.max_days)
                .await
            {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Purged expired notifications");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to purge expired notifications");
                }
            }
        }
    });

    // Build router
    let app = axum::Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            fieldline_api::middleware::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
