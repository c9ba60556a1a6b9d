//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Auth configuration.
    pub auth: AuthConfig,
    /// Push relay configuration.
    #[serde(default)]
    pub push: Option<PushConfig>,
    /// Registration coordinator windows.
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
    /// Notification retention windows.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Auth configuration.
///
/// Identity is delegated to an external provider; this service only
/// verifies the bearer tokens it issues.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret used to verify bearer JWTs from the identity provider.
    pub jwt_secret: String,
    /// Expected token issuer, if the provider sets one.
    #[serde(default)]
    pub issuer: Option<String>,
}

/// Push relay (FCM HTTP v1) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Messaging project identifier.
    pub project_id: String,
    /// Service account client email (JWT issuer).
    pub client_email: String,
    /// Service account RSA private key, PEM encoded.
    pub private_key: String,
    /// OAuth token exchange URI.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// Default notification icon URL.
    #[serde(default)]
    pub default_icon: Option<String>,
}

/// Registration coordinator windows.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorSettings {
    /// Failed attempts before the circuit opens.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Cooldown after a failed attempt, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Circuit-open quiet period, in seconds.
    #[serde(default = "default_circuit_open_secs")]
    pub circuit_open_secs: u64,
    /// Minimum interval between auto-enable attempts, in seconds.
    #[serde(default = "default_auto_enable_secs")]
    pub auto_enable_min_interval_secs: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            cooldown_secs: default_cooldown_secs(),
            circuit_open_secs: default_circuit_open_secs(),
            auto_enable_min_interval_secs: default_auto_enable_secs(),
        }
    }
}

/// Notification retention windows.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Days a read notification is kept.
    #[serde(default = "default_read_retention_days")]
    pub read_days: u32,
    /// Days any notification is kept, read or not.
    #[serde(default = "default_max_retention_days")]
    pub max_days: u32,
    /// Purge interval in seconds.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            read_days: default_read_retention_days(),
            max_days: default_max_retention_days(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_cooldown_secs() -> u64 {
    30
}

const fn default_circuit_open_secs() -> u64 {
    600
}

const fn default_auto_enable_secs() -> u64 {
    60
}

const fn default_read_retention_days() -> u32 {
    30
}

const fn default_max_retention_days() -> u32 {
    90
}

const fn default_purge_interval_secs() -> u64 {
    3600
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `FIELDLINE_ENV`)
    /// 3. Environment variables with `FIELDLINE_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("FIELDLINE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("FIELDLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("FIELDLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
