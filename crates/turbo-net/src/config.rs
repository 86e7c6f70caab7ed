//! Session configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    BackoffStrategy, CompositeInterceptor, DefaultHeaders, RetryCondition, RetryPolicy,
};

/// Default time a successful deduplicated result stays visible.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(6);

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or schema error.
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or schema error.
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for a [`Session`](crate::Session) and the layers around it.
///
/// ```toml
/// base_url = "https://api.example.com/v1"
/// max_retries = 5
///
/// [headers]
/// Accept = "application/json"
///
/// [cache]
/// ttl_ms = 6000
/// namespace = "catalog:"
///
/// [retry]
/// max_attempts = 2
/// statuses = [429]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL that relative endpoint paths resolve against.
    pub base_url: String,

    /// Hard cap on retries per request. `None` leaves the decision entirely
    /// to the interceptor chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Headers added to every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request deduplication settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Transient failure retry settings.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl SessionConfig {
    /// Create a config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            max_retries: None,
            headers: HashMap::new(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
        }
    }

    /// Load config from a file. `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Ok(serde_json::from_str(&content)?)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Build the interceptor chain described by this config.
    pub fn interceptor(&self) -> CompositeInterceptor {
        let mut chain = CompositeInterceptor::new();
        if !self.headers.is_empty() {
            let headers = self
                .headers
                .iter()
                .fold(DefaultHeaders::new(), |acc, (k, v)| {
                    acc.with_header(k.clone(), v.clone())
                });
            chain = chain.with_adapter(headers);
        }
        if self.retry.max_attempts > 0 {
            chain = chain.with_retrier(self.retry.policy());
        }
        chain
    }
}

/// Request deduplication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// How long a successful result stays visible, in milliseconds. Zero
    /// disables retention.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Prefix applied to every task key.
    #[serde(default)]
    pub namespace: String,
}

fn default_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL.as_millis() as u64
}

impl CacheSettings {
    /// TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            namespace: String::new(),
        }
    }
}

/// Transient failure retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries allowed by the policy. Zero disables it.
    #[serde(default)]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Extra status codes to retry besides 5xx.
    #[serde(default)]
    pub statuses: Vec<u16>,
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    500
}

impl RetrySettings {
    /// Build the retry policy.
    pub fn policy(&self) -> RetryPolicy {
        let mut conditions = vec![
            RetryCondition::ServerError,
            RetryCondition::Timeout,
            RetryCondition::ConnectionError,
        ];
        conditions.extend(self.statuses.iter().map(|s| RetryCondition::StatusCode(*s)));

        RetryPolicy::new(self.max_attempts)
            .with_backoff(BackoffStrategy::Exponential {
                base: Duration::from_millis(self.base_delay_ms),
                max: Duration::from_millis(self.max_delay_ms),
            })
            .with_conditions(conditions)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            statuses: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = SessionConfig::from_toml_str(r#"base_url = "https://api.example.com""#)
            .unwrap();
        assert_eq!(config, SessionConfig::new("https://api.example.com"));
        assert_eq!(config.cache.ttl(), DEFAULT_CACHE_TTL);
        assert_eq!(config.max_retries, None);
    }

    #[test]
    fn test_full_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
            base_url = "https://api.example.com/v1"
            max_retries = 5

            [headers]
            Accept = "application/json"

            [cache]
            ttl_ms = 0
            namespace = "catalog:"

            [retry]
            max_attempts = 2
            statuses = [429]
            "#,
        )
        .unwrap();

        assert_eq!(config.max_retries, Some(5));
        assert_eq!(config.cache.ttl(), Duration::ZERO);
        assert_eq!(config.cache.namespace, "catalog:");

        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, 2);
        assert!(policy.retry_on.contains(&RetryCondition::StatusCode(429)));
        assert_eq!(
            policy.backoff,
            BackoffStrategy::Exponential {
                base: Duration::from_millis(50),
                max: Duration::from_millis(500),
            }
        );
    }

    #[test]
    fn test_missing_base_url_is_an_error() {
        let err = SessionConfig::from_toml_str("max_retries = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_load_json_by_extension() {
        let path = std::env::temp_dir().join(format!("turbo-net-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"base_url": "https://json.example.com"}"#).unwrap();

        let config = SessionConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.base_url, "https://json.example.com");
    }

    #[test]
    fn test_load_missing_file() {
        let err = SessionConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
