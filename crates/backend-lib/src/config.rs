// ============================
// foundation-backend-lib/src/config.rs
// ============================
//! Configuration management.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::auth::password::PasswordParams;

/// Config file read when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "foundation.toml";

/// Prefix for environment overrides, e.g. `FOUNDATION_SESSION__DURATION_SECS`
pub const ENV_PREFIX: &str = "FOUNDATION_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Upper bound for every duration setting (ten years); keeps timestamp
/// arithmetic far from overflow.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Mark the session cookie `Secure`; enable when served over TLS
    pub secure_cookies: bool,
    pub session: SessionSettings,
    pub rate_limit: RateLimitSettings,
    /// Argon2 cost for newly hashed passwords and the decoy hash
    pub password: PasswordParams,
}

/// Session lifetime policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub duration_secs: u64,
    /// Authenticated sessions older than this are rotated
    pub rotation_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

/// Login rate limiting policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Failures within the window before the key is blocked
    pub max_attempts: u32,
    pub window_secs: u64,
    pub block_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            secure_cookies: false,
            session: SessionSettings::default(),
            rate_limit: RateLimitSettings::default(),
            password: PasswordParams::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration_secs: 90 * 24 * 60 * 60, // 90 days
            rotation_interval_secs: 30 * 60,
            cleanup_interval_secs: 10 * 60,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_secs: 60,
            block_secs: 15 * 60,
            cleanup_interval_secs: 10 * 60,
        }
    }
}

impl SessionSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl RateLimitSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Settings {
    /// Defaults, then the optional TOML file, then `FOUNDATION_*` variables
    pub fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate settings
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let path = config_file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let settings: Settings = Self::figment(path).extract().map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level: {}",
                self.log_level
            )));
        }

        let session = &self.session;
        if session.duration_secs == 0
            || session.rotation_interval_secs == 0
            || session.cleanup_interval_secs == 0
        {
            return Err(ConfigError::Invalid(
                "session durations must be non-zero".to_string(),
            ));
        }
        if session.rotation_interval_secs >= session.duration_secs {
            return Err(ConfigError::Invalid(
                "session rotation interval must be shorter than the session duration".to_string(),
            ));
        }

        let rate_limit = &self.rate_limit;
        let durations = [
            ("session.duration_secs", session.duration_secs),
            ("session.rotation_interval_secs", session.rotation_interval_secs),
            ("session.cleanup_interval_secs", session.cleanup_interval_secs),
            ("rate_limit.window_secs", rate_limit.window_secs),
            ("rate_limit.block_secs", rate_limit.block_secs),
            ("rate_limit.cleanup_interval_secs", rate_limit.cleanup_interval_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs > MAX_DURATION_SECS) {
            return Err(ConfigError::Invalid(format!(
                "{name} must not exceed {MAX_DURATION_SECS} seconds"
            )));
        }

        if rate_limit.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.max_attempts must be at least 1".to_string(),
            ));
        }
        if rate_limit.window_secs == 0
            || rate_limit.block_secs == 0
            || rate_limit.cleanup_interval_secs == 0
        {
            return Err(ConfigError::Invalid(
                "rate limit durations must be non-zero".to_string(),
            ));
        }

        self.password
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("password: {e}")))
    }
}
