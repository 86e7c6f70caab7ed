//! CLI configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use turbo_net::SessionConfig;

/// CLI configuration file: a session config plus CLI-only sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Session settings.
    #[serde(flatten)]
    pub session: SessionConfig,

    /// Credentials.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::new(""),
            auth: AuthConfig::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
        }
    }
}

/// Bearer token settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Access token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Refresh token traded in when the access token is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token endpoint, relative to the base URL.
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
}

fn default_token_endpoint() -> String {
    "oauth/token".to_string()
}
