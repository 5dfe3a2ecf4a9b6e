//! Configuration management for the bridge
//!
//! Server configuration and the user preferences the bridge reads are both
//! loaded from environment variables. User preferences are exposed through
//! [`UserConfigProvider`] so the bridge only ever reads them.

use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Timeout applied to every upstream HTTP request (in seconds)
    pub upstream_timeout_seconds: u64,

    /// Base URL of the hosted-session (Bing) backend
    pub bing_api_url: String,

    /// User preferences served to the bridge
    pub user: UserConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("BRIDGE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("BRIDGE_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid BRIDGE_PORT")?,

            upstream_timeout_seconds: env::var("UPSTREAM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid UPSTREAM_TIMEOUT_SECONDS")?,

            bing_api_url: env::var("BING_API_URL")
                .unwrap_or_else(|_| "https://www.bing.com".to_string()),

            user: UserConfig::from_env()?,
        })
    }
}

/// Conversation tone/mode selector handed to adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    #[default]
    Balanced,
    Creative,
    Precise,
    Fast,
}

impl ModelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelMode::Balanced => "balanced",
            ModelMode::Creative => "creative",
            ModelMode::Precise => "precise",
            ModelMode::Fast => "fast",
        }
    }
}

impl fmt::Display for ModelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "balanced" => Ok(ModelMode::Balanced),
            "creative" => Ok(ModelMode::Creative),
            "precise" => Ok(ModelMode::Precise),
            "fast" => Ok(ModelMode::Fast),
            other => Err(anyhow::anyhow!("Unknown model mode: {}", other)),
        }
    }
}

/// User preferences read by the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    /// Model key used when the caller does not name one
    pub model_name: String,
    pub model_mode: ModelMode,
    /// OpenAI API key for the key-authenticated client
    pub api_key: Option<String>,
    pub custom_model_name: String,
    pub custom_model_api_url: String,
    pub custom_openai_api_url: String,
    pub custom_chatgpt_web_api_url: String,
    pub custom_chatgpt_web_api_path: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            model_name: "chatgptFree35".to_string(),
            model_mode: ModelMode::Balanced,
            api_key: None,
            custom_model_name: "rwkv".to_string(),
            custom_model_api_url: "http://localhost:8000/v1/chat/completions".to_string(),
            custom_openai_api_url: "https://api.openai.com".to_string(),
            custom_chatgpt_web_api_url: "https://chat.openai.com".to_string(),
            custom_chatgpt_web_api_path: "/backend-api/conversation".to_string(),
        }
    }
}

impl UserConfig {
    /// Load user preferences from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            model_name: env::var("BRIDGE_MODEL_NAME").unwrap_or(defaults.model_name),
            model_mode: match env::var("BRIDGE_MODEL_MODE") {
                Ok(mode) => mode.parse().context("Invalid BRIDGE_MODEL_MODE")?,
                Err(_) => defaults.model_mode,
            },
            api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            custom_model_name: env::var("CUSTOM_MODEL_NAME")
                .unwrap_or(defaults.custom_model_name),
            custom_model_api_url: env::var("CUSTOM_MODEL_API_URL")
                .unwrap_or(defaults.custom_model_api_url),
            custom_openai_api_url: env::var("OPENAI_API_URL")
                .unwrap_or(defaults.custom_openai_api_url),
            custom_chatgpt_web_api_url: env::var("CHATGPT_WEB_API_URL")
                .unwrap_or(defaults.custom_chatgpt_web_api_url),
            custom_chatgpt_web_api_path: env::var("CHATGPT_WEB_API_PATH")
                .unwrap_or(defaults.custom_chatgpt_web_api_path),
        })
    }
}

/// Read-only source of user preferences
#[async_trait]
pub trait UserConfigProvider: Send + Sync {
    async fn user_config(&self) -> AppResult<UserConfig>;
}

/// Serves a fixed [`UserConfig`] captured at startup
#[derive(Debug, Clone)]
pub struct StaticUserConfig(UserConfig);

impl StaticUserConfig {
    pub fn new(config: UserConfig) -> Self {
        Self(config)
    }
}

#[async_trait]
impl UserConfigProvider for StaticUserConfig {
    async fn user_config(&self) -> AppResult<UserConfig> {
        Ok(self.0.clone())
    }
}
