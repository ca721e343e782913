//! Server configuration loaded from the environment.
//!
//! ```bash
//! STUDYHUB_JWT_SECRET=...            # required, at least 32 bytes
//! STUDYHUB_TOKEN_TTL_HOURS=24        # bearer token lifetime
//! STUDYHUB_SWEEP_INTERVAL_SECS=3600  # join request expiry sweep, 0 disables
//! STUDYHUB_LOG_FORMAT=text           # or json
//! ```

use std::env;
use std::time::Duration;
use thiserror::Error;

pub const MIN_JWT_SECRET_LEN: usize = 32;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("STUDYHUB_LOG_FORMAT") {
            Err(_) => Ok(LogFormat::Text),
            Ok(v) => match v.to_lowercase().as_str() {
                "" | "text" => Ok(LogFormat::Text),
                "json" => Ok(LogFormat::Json),
                other => Err(ConfigError::InvalidLogFormat(other.to_string())),
            },
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HMAC key for HS256 bearer tokens
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// `None` disables the background expiry sweep
    pub sweep_interval: Option<Duration>,
    pub log_format: LogFormat,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("STUDYHUB_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes (got {0})")]
    JwtSecretTooShort(usize),

    #[error("Invalid value for {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Invalid log format: {0}. Expected 'text' or 'json'")]
    InvalidLogFormat(String),
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("STUDYHUB_JWT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("STUDYHUB_JWT_SECRET".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::JwtSecretTooShort(jwt_secret.len()));
        }

        let token_ttl_hours = parse_var("STUDYHUB_TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)?;
        if token_ttl_hours <= 0 {
            return Err(ConfigError::InvalidNumber {
                var: "STUDYHUB_TOKEN_TTL_HOURS",
                value: token_ttl_hours.to_string(),
            });
        }

        let sweep_secs = parse_var("STUDYHUB_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        let sweep_interval = (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs));

        Ok(Self {
            jwt_secret,
            token_ttl_hours,
            sweep_interval,
            log_format: LogFormat::from_env()?,
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "STUDYHUB_JWT_SECRET",
        "STUDYHUB_TOKEN_TTL_HOURS",
        "STUDYHUB_SWEEP_INTERVAL_SECS",
        "STUDYHUB_LOG_FORMAT",
    ];

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
    }

    impl<'a> EnvGuard<'a> {
        fn new() -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            for var in ENV_VARS {
                env::remove_var(var);
            }
            Self { _lock: lock }
        }

        fn set(&self, key: &str, value: &str) {
            env::set_var(key, value);
        }
    }

    impl<'a> Drop for EnvGuard<'a> {
        fn drop(&mut self) {
            for var in ENV_VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_defaults() {
        let guard = EnvGuard::new();
        guard.set("STUDYHUB_JWT_SECRET", SECRET);

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.token_ttl_hours, 24);
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(3600)));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.token_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_missing_secret() {
        let _guard = EnvGuard::new();
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::MissingEnvVar(var)) if var == "STUDYHUB_JWT_SECRET"
        ));
    }

    #[test]
    fn test_short_secret() {
        let guard = EnvGuard::new();
        guard.set("STUDYHUB_JWT_SECRET", "short");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::JwtSecretTooShort(5))
        ));
    }

    #[test]
    fn test_overrides() {
        let guard = EnvGuard::new();
        guard.set("STUDYHUB_JWT_SECRET", SECRET);
        guard.set("STUDYHUB_TOKEN_TTL_HOURS", "2");
        guard.set("STUDYHUB_SWEEP_INTERVAL_SECS", "0");
        guard.set("STUDYHUB_LOG_FORMAT", "JSON");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.token_ttl_hours, 2);
        assert!(config.sweep_interval.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_numbers() {
        let guard = EnvGuard::new();
        guard.set("STUDYHUB_JWT_SECRET", SECRET);
        guard.set("STUDYHUB_SWEEP_INTERVAL_SECS", "hourly");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidNumber { var: "STUDYHUB_SWEEP_INTERVAL_SECS", .. })
        ));

        guard.set("STUDYHUB_SWEEP_INTERVAL_SECS", "60");
        guard.set("STUDYHUB_TOKEN_TTL_HOURS", "0");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidNumber { var: "STUDYHUB_TOKEN_TTL_HOURS", .. })
        ));
    }

    #[test]
    fn test_invalid_log_format() {
        let guard = EnvGuard::new();
        guard.set("STUDYHUB_JWT_SECRET", SECRET);
        guard.set("STUDYHUB_LOG_FORMAT", "xml");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidLogFormat(f)) if f == "xml"
        ));
    }
}
