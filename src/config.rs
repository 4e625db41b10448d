//! Configuration for cardfront.
//!
//! Settings are loaded with priority: env var > `~/.cardfront/.env` > default.
//! The app-home `.env` is loaded via dotenvy early in startup; call
//! [`load_cardfront_env`] after `dotenvy::dotenv()` so the working-directory
//! `.env` takes priority (dotenvy never overwrites existing vars).

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Default bearer-credential validity window.
pub const DEFAULT_TOKEN_VALIDITY_SECS: u64 = 3600;
/// Default expiry-monitor tick interval.
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 60;
/// Default "expiring soon" warning threshold.
pub const DEFAULT_EXPIRY_WARNING_SECS: u64 = 300;
/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Main configuration for the client core.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    /// Directory holding persisted session keys, `~/.cardfront` by default.
    pub storage_dir: PathBuf,
    /// Embedded smart-account app identifier, required only by the
    /// embedded-wallet strategy.
    pub embedded_app_id: Option<String>,
    /// Mini-app wallet channel identifier, required only by the
    /// cross-chain strategy.
    pub miniapp_channel_id: Option<String>,
}

/// Card-issuer API connection settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    /// Partner/program identifier sent with every request.
    pub partner_id: String,
    pub request_timeout: Duration,
}

/// Session lifecycle tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub token_validity: Duration,
    pub monitor_interval: Duration,
    pub expiry_warning_threshold: Duration,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Missing required identifiers fail here, at startup, rather than on
    /// first use.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required_env(
            "CARDFRONT_API_BASE_URL",
            "Set it to the card-issuer API origin, e.g. https://api.example.com",
        )?;
        let base_url = Url::parse(base_url.trim()).map_err(|e| ConfigError::InvalidValue {
            key: "CARDFRONT_API_BASE_URL".to_string(),
            message: e.to_string(),
        })?;

        let partner_id = required_env(
            "CARDFRONT_PARTNER_ID",
            "Set it to the partner id issued with your card program.",
        )?;

        Ok(Self {
            api: ApiConfig {
                base_url,
                partner_id,
                request_timeout: Duration::from_millis(env_u64(
                    "CARDFRONT_REQUEST_TIMEOUT_MS",
                    DEFAULT_REQUEST_TIMEOUT_MS,
                )?),
            },
            session: SessionConfig {
                token_validity: Duration::from_secs(env_u64(
                    "CARDFRONT_TOKEN_VALIDITY_SECS",
                    DEFAULT_TOKEN_VALIDITY_SECS,
                )?),
                monitor_interval: Duration::from_secs(env_u64(
                    "CARDFRONT_MONITOR_INTERVAL_SECS",
                    DEFAULT_MONITOR_INTERVAL_SECS,
                )?),
                expiry_warning_threshold: Duration::from_secs(env_u64(
                    "CARDFRONT_EXPIRY_WARNING_SECS",
                    DEFAULT_EXPIRY_WARNING_SECS,
                )?),
            },
            storage_dir: optional_env("CARDFRONT_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(cardfront_home),
            embedded_app_id: optional_env("CARDFRONT_EMBEDDED_APP_ID"),
            miniapp_channel_id: optional_env("CARDFRONT_MINIAPP_CHANNEL_ID"),
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_validity: Duration::from_secs(DEFAULT_TOKEN_VALIDITY_SECS),
            monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS),
            expiry_warning_threshold: Duration::from_secs(DEFAULT_EXPIRY_WARNING_SECS),
        }
    }
}

/// The cardfront app-home directory: `~/.cardfront`.
pub fn cardfront_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cardfront")
}

/// Load env vars from `~/.cardfront/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()`. Effective priority:
///
///   explicit env vars > `./.env` > `~/.cardfront/.env`
pub fn load_cardfront_env() {
    let path = cardfront_home().join(".env");
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}

fn required_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    match optional_env(key) {
        Some(value) => Ok(value),
        None => Err(ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        }),
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match optional_env(key) {
        Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got '{raw}'"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_config_matches_documented_windows() {
        let session = SessionConfig::default();
        assert_eq!(session.token_validity, Duration::from_secs(3600));
        assert_eq!(session.monitor_interval, Duration::from_secs(60));
        assert_eq!(session.expiry_warning_threshold, Duration::from_secs(300));
    }

    #[test]
    fn cardfront_home_is_under_the_home_dir() {
        let home = cardfront_home();
        assert!(home.ends_with(".cardfront"));
    }
}
