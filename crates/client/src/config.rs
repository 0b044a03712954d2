//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TASTY_API_URL` - Base URL of the REST backend (e.g., `https://shop.example.com/api`)
//!
//! ## Optional
//! - `TASTY_STORAGE_PATH` - Persistent storage file (default: `.tasty-bites/storage.json`)
//! - `TASTY_REQUEST_TIMEOUT_SECS` - Per-request HTTP timeout (default: 30)
//! - `TASTY_REFRESH_TIMEOUT_SECS` - Upper bound on one shared token refresh (default: 30)
//! - `TASTY_REFRESH_INTERVAL_SECS` - Expiry check interval (default: 60)
//! - `TASTY_REFRESH_THRESHOLD_SECS` - Proactive refresh window before expiry (default: 300)
//! - `TASTY_MISSING_EXPIRY` - `valid` or `expired`: how a token with no stored expiry is treated (default: `valid`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is appended to.
    pub api_url: Url,
    /// File backing the persistent key-value store.
    pub storage_path: PathBuf,
    /// HTTP pipeline settings.
    pub http: HttpConfig,
    /// Session lifecycle settings.
    pub session: SessionConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// HTTP pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Timeout applied to each request by the transport.
    pub request_timeout: Duration,
    /// Upper bound on a shared refresh; queued requests fail when it elapses.
    pub refresh_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(30),
        }
    }
}

/// How a stored access token without an expiry timestamp is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingExpiry {
    /// Treat the token as still valid (fail open).
    #[default]
    TreatAsValid,
    /// Treat the token as expired (fail closed).
    TreatAsExpired,
}

impl FromStr for MissingExpiry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "valid" => Ok(Self::TreatAsValid),
            "expired" => Ok(Self::TreatAsExpired),
            other => Err(format!("expected `valid` or `expired`, got `{other}`")),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How often the expiry watch checks the stored expiry.
    pub refresh_interval: Duration,
    /// Remaining lifetime below which the watch refreshes proactively.
    pub refresh_threshold: Duration,
    /// Policy for `Store::is_expired` when no expiry is stored.
    pub missing_expiry: MissingExpiry,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(5 * 60),
            missing_expiry: MissingExpiry::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = lookup("TASTY_API_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("TASTY_API_URL".to_string()))?;
        let api_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidEnvVar("TASTY_API_URL".to_string(), e.to_string()))?;

        let storage_path = PathBuf::from(
            lookup("TASTY_STORAGE_PATH").unwrap_or_else(|| ".tasty-bites/storage.json".to_string()),
        );

        let http = HttpConfig {
            request_timeout: parse_secs(&lookup, "TASTY_REQUEST_TIMEOUT_SECS", 30)?,
            refresh_timeout: parse_secs(&lookup, "TASTY_REFRESH_TIMEOUT_SECS", 30)?,
        };

        let missing_expiry = match lookup("TASTY_MISSING_EXPIRY") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidEnvVar("TASTY_MISSING_EXPIRY".to_string(), e))?,
            None => MissingExpiry::default(),
        };

        let session = SessionConfig {
            refresh_interval: parse_secs(&lookup, "TASTY_REFRESH_INTERVAL_SECS", 60)?,
            refresh_threshold: parse_secs(&lookup, "TASTY_REFRESH_THRESHOLD_SECS", 300)?,
            missing_expiry,
        };

        Ok(Self {
            api_url,
            storage_path,
            http,
            session,
            sentry_dsn: lookup("SENTRY_DSN").filter(|dsn| !dsn.is_empty()),
        })
    }
}

/// Parse a whole number of seconds, rejecting zero (a zero interval would spin).
fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            ClientConfig::from_lookup(lookup_from(&[("TASTY_API_URL", "http://localhost:5000/api")]))
                .unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:5000/api");
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.http, HttpConfig::default());
        assert_eq!(config.storage_path, PathBuf::from(".tasty-bites/storage.json"));
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_missing_api_url() {
        let err = ClientConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "TASTY_API_URL"));
    }

    #[test]
    fn test_invalid_api_url() {
        let err = ClientConfig::from_lookup(lookup_from(&[("TASTY_API_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(..)));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("TASTY_API_URL", "https://shop.example.com/api"),
            ("TASTY_REFRESH_INTERVAL_SECS", "15"),
            ("TASTY_REFRESH_THRESHOLD_SECS", "120"),
            ("TASTY_MISSING_EXPIRY", "Expired"),
            ("SENTRY_DSN", "https://key@sentry.example.com/1"),
        ]))
        .unwrap();
        assert_eq!(config.session.refresh_interval, Duration::from_secs(15));
        assert_eq!(config.session.refresh_threshold, Duration::from_secs(120));
        assert_eq!(config.session.missing_expiry, MissingExpiry::TreatAsExpired);
        assert!(config.sentry_dsn.is_some());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            ("TASTY_API_URL", "https://shop.example.com/api"),
            ("TASTY_REFRESH_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "TASTY_REFRESH_INTERVAL_SECS"));
    }
}
