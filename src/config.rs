/*!
Configuration for the morningbyte pipeline.

Loaded from TOML (optional `config.default.toml` merged with an override
file), then adjusted from the environment for the values that deployment
pipelines inject directly: `RSS_FEED_URLS` (comma-separated) and
`EMAIL_RECIPIENT`. API keys are never stored in the file; sections name the
environment variable to read instead.
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/morningbyte.db")
    pub path: String,
}

/// Feed collection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Source feed URLs; overridden by RSS_FEED_URLS when set
    #[serde(default)]
    pub urls: Vec<String>,
    /// Global cap on collected articles per run (default 200)
    pub max_articles: Option<usize>,
    pub fetch_timeout_seconds: Option<u64>,
}

/// Remote model configuration (OpenAI-compatible chat endpoint)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
}

/// Mail delivery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Overridden by EMAIL_RECIPIENT when set
    pub recipient: Option<String>,
    /// Where the authorized-user token JSON is read and persisted
    pub token_path: Option<String>,
    /// OAuth client secrets file for the interactive flow
    pub client_secrets_path: Option<String>,
    /// Environment variable that may carry the token JSON verbatim
    pub token_env: Option<String>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub email: EmailConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value =
                    toml::from_str(&data).context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value =
                    toml::from_str(&data).context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Apply the environment overrides the deployment environment may set.
    /// File values are kept when the corresponding variable is absent.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("RSS_FEED_URLS") {
            let urls: Vec<String> = raw
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
            if !urls.is_empty() {
                self.feeds.urls = urls;
            }
        }
        if let Ok(recipient) = std::env::var("EMAIL_RECIPIENT") {
            if !recipient.trim().is_empty() {
                self.email.recipient = Some(recipient.trim().to_string());
            }
        }
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}
