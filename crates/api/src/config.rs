use domain::models::AlertLevel;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Device transport settings
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Scheduled task evaluation
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// Push notification configuration
    #[serde(default)]
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Credentials and timeouts for talking to gateway devices.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Used to derive the fallback token for devices registered without one.
    #[serde(default = "default_admin_user")]
    pub admin_user: String,

    #[serde(default = "default_admin_password")]
    pub admin_password: String,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,

    /// Devices silent for longer than this are marked offline.
    #[serde(default = "default_offline_after")]
    pub offline_after_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            admin_user: default_admin_user(),
            admin_password: default_admin_password(),
            command_timeout_secs: default_command_timeout(),
            batch_timeout_secs: default_batch_timeout(),
            offline_after_secs: default_offline_after(),
        }
    }
}

impl DeviceConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Devices contacted at once per batch. 1 runs members in order.
    #[serde(default = "default_batch_concurrency")]
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_batch_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Run the tick in-process. When false an external caller drives `/api/cron`.
    #[serde(default)]
    pub internal_ticker: bool,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_debounce")]
    pub debounce_secs: i64,

    #[serde(default = "default_cron_lookback")]
    pub cron_lookback_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            internal_ticker: false,
            tick_interval_secs: default_tick_interval(),
            debounce_secs: default_debounce(),
            cron_lookback_secs: default_cron_lookback(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_weak_signal")]
    pub weak_signal_dbm: i32,

    #[serde(default = "default_critical_signal")]
    pub critical_signal_dbm: i32,

    /// Lowest level forwarded to the notifier.
    #[serde(default = "default_notify_min_level")]
    pub notify_min_level: AlertLevel,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            weak_signal_dbm: default_weak_signal(),
            critical_signal_dbm: default_critical_signal(),
            notify_min_level: default_notify_min_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_bark_base_url")]
    pub bark_base_url: String,

    /// Bark device key. Notifications are skipped when empty.
    #[serde(default)]
    pub bark_device_key: String,

    #[serde(default = "default_notification_group")]
    pub group: String,

    #[serde(default = "default_notification_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bark_base_url: default_bark_base_url(),
            bark_device_key: String::new(),
            group: default_notification_group(),
            timeout_ms: default_notification_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_admin_user() -> String {
    "admin".to_string()
}
fn default_admin_password() -> String {
    "admin".to_string()
}
fn default_command_timeout() -> u64 {
    10
}
fn default_batch_timeout() -> u64 {
    5
}
fn default_offline_after() -> u64 {
    300
}
fn default_batch_concurrency() -> usize {
    1
}
fn default_tick_interval() -> u64 {
    60
}
fn default_debounce() -> i64 {
    60
}
fn default_cron_lookback() -> i64 {
    600
}
fn default_weak_signal() -> i32 {
    -100
}
fn default_critical_signal() -> i32 {
    -110
}
fn default_notify_min_level() -> AlertLevel {
    AlertLevel::Warning
}
fn default_bark_base_url() -> String {
    "https://api.day.app".to_string()
}
fn default_notification_group() -> String {
    "Green-Manager-Alerts".to_string()
}
fn default_notification_timeout_ms() -> u64 {
    5000
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with GW__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("GW").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides, without touching
    /// config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 20
            min_connections = 2
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [device]
            admin_user = "admin"
            admin_password = "admin"

            [scheduler]
            internal_ticker = false

            [alerts]
            notify_min_level = "warning"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        // Validation skipped so tests can load partial configs
        builder.build()?.try_deserialize()
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "GW__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.alerts.weak_signal_dbm <= self.alerts.critical_signal_dbm {
            return Err(ConfigValidationError::InvalidValue(
                "weak_signal_dbm must be above critical_signal_dbm".to_string(),
            ));
        }

        if self.batch.max_concurrency == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "batch max_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
