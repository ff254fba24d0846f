//! Configuration management
//!
//! Configuration is loaded from `config.yml` and then overridden by
//! environment variables. Missing optional values are filled with defaults.
//!
//! The resulting [`Config`] is built once at startup and handed to the
//! services that need it; nothing here is stored in a global.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Secret used to sign session cookies outside production when none is set.
const DEVELOPMENT_SESSION_SECRET: &str = "roberts-development-session-secret-do-not-use";

/// Minimum length of the cookie signing secret in production.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Longest accepted session lifetime (ten years).
pub const MAX_SESSION_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Runtime environment
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
    /// First administrator, created at startup when no user exists
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Runtime environment.
///
/// Controls whether internal error details reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Whether internal errors are caught and replaced by a generic message.
    ///
    /// Development and test let the details through so failures are visible.
    pub fn handle_exceptions(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(anyhow::anyhow!("Invalid environment: {}", s)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin accepted on state-changing requests. Requests carrying another
    /// `Origin` header are rejected.
    #[serde(default)]
    pub allowed_origin: Option<String>,
    /// Prefix the application is mounted under (e.g. `/helpdesk`)
    #[serde(default)]
    pub mount_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origin: None,
            mount_path: String::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2300
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/roberts.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session cookie and lifetime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the cookie carrying the session token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: i64,
    /// Interval between expired-session sweeps, in seconds (0 disables)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Cookie signing secret (`WEB_SESSIONS_SECRET`)
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    /// Add the `Secure` attribute to the cookie
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_seconds: default_session_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
            secret: None,
            secure_cookie: false,
        }
    }
}

fn default_cookie_name() -> String {
    "session_token".to_string()
}

fn default_session_ttl() -> i64 {
    7 * 24 * 60 * 60 // 7 days
}

fn default_sweep_interval() -> u64 {
    300
}

/// Outbound mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP user (`MANDRILL_USERNAME`)
    #[serde(default)]
    pub username: Option<String>,
    /// SMTP password (`MANDRILL_PASSWORD`)
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Sender address
    #[serde(default = "default_mail_from")]
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from: default_mail_from(),
        }
    }
}

impl MailConfig {
    /// SMTP delivery is only possible with both credentials present.
    pub fn has_credentials(&self) -> bool {
        matches!((&self.username, &self.password), (Some(u), Some(p)) if !u.is_empty() && !p.is_empty())
    }
}

fn default_smtp_host() -> String {
    "smtp.mandrillapp.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "Roberts Help Desk <helpdesk@localhost>".to_string()
}

/// Translation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I18nConfig {
    /// Directory holding `*.yml` locale files
    #[serde(default = "default_locales_path")]
    pub locales_path: PathBuf,
    #[serde(default = "default_locale")]
    pub default_locale: String,
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            locales_path: default_locales_path(),
            default_locale: default_locale(),
        }
    }
}

fn default_locales_path() -> PathBuf {
    PathBuf::from("locales")
}

fn default_locale() -> String {
    "en".to_string()
}

/// Credentials of the administrator created on an empty database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file, apply environment overrides and validate.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("ROBERTS_ENV") {
            if let Ok(env) = env.parse::<Environment>() {
                self.environment = env;
            }
        }

        // Server configuration
        if let Ok(host) = std::env::var("ROBERTS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ROBERTS_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(origin) = std::env::var("ROBERTS_SERVER_ALLOWED_ORIGIN") {
            self.server.allowed_origin = Some(origin);
        }

        // Database configuration
        if let Ok(driver) = std::env::var("ROBERTS_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("ROBERTS_DATABASE_URL") {
            self.database.url = url;
        }

        // Sessions
        if let Ok(secret) = std::env::var("WEB_SESSIONS_SECRET") {
            self.session.secret = Some(secret);
        }
        if let Ok(ttl) = std::env::var("ROBERTS_SESSION_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.session.ttl_seconds = ttl;
            }
        }
        if let Ok(interval) = std::env::var("ROBERTS_SESSION_SWEEP_INTERVAL_SECONDS") {
            if let Ok(interval) = interval.parse::<u64>() {
                self.session.sweep_interval_seconds = interval;
            }
        }

        // Mail
        if let Ok(username) = std::env::var("MANDRILL_USERNAME") {
            self.mail.username = Some(username);
        }
        if let Ok(password) = std::env::var("MANDRILL_PASSWORD") {
            self.mail.password = Some(password);
        }
        if let Ok(from) = std::env::var("ROBERTS_MAIL_FROM") {
            self.mail.from = from;
        }

        // Translations
        if let Ok(path) = std::env::var("ROBERTS_LOCALES_PATH") {
            self.i18n.locales_path = PathBuf::from(path);
        }
        if let Ok(locale) = std::env::var("ROBERTS_DEFAULT_LOCALE") {
            self.i18n.default_locale = locale;
        }

        // First admin
        if let (Ok(name), Ok(password)) = (
            std::env::var("ROBERTS_ADMIN_NAME"),
            std::env::var("ROBERTS_ADMIN_PASSWORD"),
        ) {
            self.bootstrap_admin = Some(BootstrapAdmin { name, password });
        }
    }

    /// Check settings that cannot be defaulted.
    ///
    /// Production refuses to start without a strong cookie secret. Other
    /// environments fall back to a fixed development secret.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let has_secret = self
            .session
            .secret
            .as_deref()
            .is_some_and(|s| !s.is_empty());

        if self.environment == Environment::Production {
            match self.session.secret.as_deref() {
                Some(s) if s.len() >= MIN_SESSION_SECRET_LEN => {}
                _ => {
                    return Err(ConfigError::ValidationError(format!(
                        "WEB_SESSIONS_SECRET must be set to at least {} bytes in production",
                        MIN_SESSION_SECRET_LEN
                    )))
                }
            }
        } else if !has_secret {
            tracing::warn!(
                "WEB_SESSIONS_SECRET is not set; using the development secret ({})",
                self.environment
            );
            self.session.secret = Some(DEVELOPMENT_SESSION_SECRET.to_string());
        }

        if self.session.ttl_seconds <= 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_seconds must be positive".to_string(),
            ));
        }
        if self.session.ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "session.ttl_seconds must be at most {}",
                MAX_SESSION_TTL_SECONDS
            )));
        }

        Ok(())
    }

    /// Cookie signing secret. Only meaningful after [`Config::validate`].
    pub fn session_secret(&self) -> &str {
        self.session
            .secret
            .as_deref()
            .unwrap_or(DEVELOPMENT_SESSION_SECRET)
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test touching process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn port_from_file_is_preserved(port in 1u16..=65535u16) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", port).unwrap();
            let config = Config::load(file.path()).unwrap();
            prop_assert_eq!(config.server.port, port);
        }

        #[test]
        fn positive_ttl_validates(ttl in 1i64..=31_536_000i64) {
            let mut config = Config::default();
            config.session.ttl_seconds = ttl;
            prop_assert!(config.validate().is_ok());
        }
    }
}
