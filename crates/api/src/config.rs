use chrono_tz::Tz;
use domain::models::delivery::parse_weekday;
use domain::models::{DeliveryBucket, DeliveryTargets, UserRole};
use domain::services::PassPolicy;
use serde::Deserialize;
use shared::validation::{validate_email_recipient, validate_trigger_time};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    /// Email channel configuration
    #[serde(default)]
    pub email: EmailConfig,
    /// Telegram channel configuration
    #[serde(default)]
    pub telegram: TelegramConfig,
    pub passes: PassesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
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

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Shared secret expected in the `X-API-Key` header
    #[serde(default)]
    pub api_key: String,
}

/// Email channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Whether email delivery is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Email provider: smtp or console (for development)
    #[serde(default = "default_email_provider")]
    pub provider: String,

    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: String,

    #[serde(default)]
    pub smtp_password: String,

    /// STARTTLS when true, plain connection otherwise
    #[serde(default = "default_smtp_tls")]
    pub smtp_use_tls: bool,

    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    #[serde(default = "default_sender_name")]
    pub sender_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_email_provider(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_use_tls: default_smtp_tls(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
        }
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub bot_token: String,

    #[serde(default = "default_telegram_api_base_url")]
    pub api_base_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            api_base_url: default_telegram_api_base_url(),
        }
    }
}

/// Pass scheduling and delivery settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PassesConfig {
    /// IANA timezone used for send times, triggers and report dates
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Roles that never need a pass on registration
    #[serde(default)]
    pub excluded_roles: Vec<String>,

    #[serde(default)]
    pub email_recipients: Vec<String>,

    #[serde(default)]
    pub chat_id: Option<String>,

    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,

    #[serde(default = "default_weekday_bucket")]
    pub weekday: BucketConfig,

    #[serde(default = "default_weekend_bucket")]
    pub weekend: BucketConfig,
}

/// Wall-clock trigger of one delivery bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    #[serde(default = "default_true")]
    pub active: bool,
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    pub weekdays: Vec<String>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    10
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
fn default_email_provider() -> String {
    "console".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_tls() -> bool {
    true
}
fn default_sender_email() -> String {
    "passes@clubs.example".to_string()
}
fn default_sender_name() -> String {
    "Club Passes".to_string()
}
fn default_telegram_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_timezone() -> String {
    "Europe/Moscow".to_string()
}
fn default_delivery_timeout() -> u64 {
    180
}
fn default_true() -> bool {
    true
}
fn default_weekday_bucket() -> BucketConfig {
    BucketConfig {
        active: true,
        hour: 16,
        minute: 0,
        weekdays: ["Mon", "Tue", "Wed", "Thu", "Fri"]
            .iter()
            .map(|d| d.to_string())
            .collect(),
    }
}
fn default_weekend_bucket() -> BucketConfig {
    BucketConfig {
        active: true,
        hour: 12,
        minute: 0,
        weekdays: vec!["Sat".to_string(), "Sun".to_string()],
    }
}

/// Configuration validation error
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
    /// 3. Environment variables with PASS__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("PASS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("passes.email_recipients")
                    .with_list_parse_key("passes.excluded_roles")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 10
            min_connections = 2

            [logging]
            level = "info"
            format = "json"

            [security]
            api_key = "test-api-key"

            [email]
            enabled = false
            provider = "console"
            sender_email = "test@example.com"
            sender_name = "Test"

            [passes]
            timezone = "Europe/Moscow"
            email_recipients = ["security@campus.example"]
            chat_id = "-100123"

            [passes.weekday]
            active = true
            hour = 16
            minute = 0
            weekdays = ["Mon", "Tue", "Wed", "Thu", "Fri"]

            [passes.weekend]
            active = true
            hour = 12
            minute = 0
            weekdays = ["Sat", "Sun"]
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "PASS__DATABASE__URL environment variable must be set".to_string(),
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

        if self.security.api_key.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "PASS__SECURITY__API_KEY environment variable must be set".to_string(),
            ));
        }

        match self.email.provider.as_str() {
            "console" => {}
            "smtp" => {
                if self.email.enabled && self.email.smtp_host.is_empty() {
                    return Err(ConfigValidationError::MissingRequired(
                        "email.smtp_host is required for the smtp provider".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "Unknown email provider: {}",
                    other
                )));
            }
        }

        if self.telegram.enabled && self.telegram.bot_token.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "telegram.bot_token is required when Telegram is enabled".to_string(),
            ));
        }

        if self.passes.delivery_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "passes.delivery_timeout_secs must be positive".to_string(),
            ));
        }

        for recipient in &self.passes.email_recipients {
            validate_email_recipient(recipient).map_err(|_| {
                ConfigValidationError::InvalidValue(format!("Invalid email recipient: {}", recipient))
            })?;
        }

        self.pass_policy()?;
        self.delivery_buckets()?;
        Ok(())
    }

    /// Returns the server listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "Invalid socket address {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }

    pub fn timezone(&self) -> Result<Tz, ConfigValidationError> {
        shared::time::parse_timezone(&self.passes.timezone)
            .map_err(|e| ConfigValidationError::InvalidValue(e.to_string()))
    }

    /// Timezone and role exclusions for pass creation.
    pub fn pass_policy(&self) -> Result<PassPolicy, ConfigValidationError> {
        let excluded_roles = self
            .passes
            .excluded_roles
            .iter()
            .map(|role| {
                role.parse::<UserRole>()
                    .map_err(ConfigValidationError::InvalidValue)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PassPolicy {
            timezone: self.timezone()?,
            excluded_roles,
        })
    }

    pub fn delivery_targets(&self) -> DeliveryTargets {
        DeliveryTargets {
            email_recipients: self.passes.email_recipients.clone(),
            chat_id: self
                .passes
                .chat_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.passes.delivery_timeout_secs)
    }

    /// Builds the weekday and weekend buckets from their trigger settings.
    pub fn delivery_buckets(&self) -> Result<Vec<DeliveryBucket>, ConfigValidationError> {
        let tz = self.timezone()?;
        let targets = self.delivery_targets();

        let weekday = apply_bucket(
            DeliveryBucket::weekday(tz, targets.clone()),
            &self.passes.weekday,
        )?;
        let weekend = apply_bucket(DeliveryBucket::weekend(tz, targets), &self.passes.weekend)?;
        Ok(vec![weekday, weekend])
    }
}

fn apply_bucket(
    mut bucket: DeliveryBucket,
    config: &BucketConfig,
) -> Result<DeliveryBucket, ConfigValidationError> {
    validate_trigger_time(config.hour, config.minute).map_err(|_| {
        ConfigValidationError::InvalidValue(format!(
            "Invalid trigger time {:02}:{:02} for the {} bucket",
            config.hour, config.minute, bucket.name
        ))
    })?;

    let weekdays = config
        .weekdays
        .iter()
        .map(|name| {
            parse_weekday(name).ok_or_else(|| {
                ConfigValidationError::InvalidValue(format!(
                    "Unknown weekday '{}' in the {} bucket",
                    name, bucket.name
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if config.active && weekdays.is_empty() {
        return Err(ConfigValidationError::InvalidValue(format!(
            "The {} bucket has no weekdays",
            bucket.name
        )));
    }

    bucket.active = config.active;
    bucket.trigger.hour = config.hour;
    bucket.trigger.minute = config.minute;
    bucket.trigger.weekdays = weekdays;
    Ok(bucket)
}
