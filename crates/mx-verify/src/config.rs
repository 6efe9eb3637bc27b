//! Probe configuration types and loading logic.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use mx_intercept::HttpConfig;
use serde::Deserialize;

/// Top-level probe configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    /// Base URL of the interception endpoint. Absent means the
    /// surrounding deployment has interception disabled; the probe has
    /// nothing to verify then and exits with an error.
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Proxy authentication secret sent as `mx-api-key`.
    #[serde(default)]
    pub api_key: String,

    /// Path to the endpoint's usage database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Real provider URL the probe request pretends to target.
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Model named in the probe request body.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub settle: SettleSettings,
}

/// Settlement window, in config-friendly units.
#[derive(Debug, Clone, Deserialize)]
pub struct SettleSettings {
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_db_path() -> String {
    "data/mx.db".to_string()
}

fn default_target_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_grace_secs() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl VerifyConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (MX_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut config: VerifyConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("MX_").split("__"))
            .extract()?;

        // Direct env var overrides matching the deployed endpoint's
        // variable names.
        if let Ok(url) = std::env::var("MX_API_BASE_URL") {
            config.api_base_url = Some(url);
        }
        if let Ok(key) = std::env::var("MX_API_KEY") {
            config.api_key = key;
        }
        if let Ok(path) = std::env::var("MX_DB_PATH") {
            config.db_path = path;
        }

        Ok(config)
    }
}
