use std::time::Duration;

use crate::adjustment::DEFAULT_BASE_GOAL;
use crate::error::{Error, Result};

/// Environment variable holding the vision service API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable overriding the chat-completions base URL.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
/// Environment variable overriding the vision model.
pub const MODEL_ENV: &str = "FOOD_ANALYSIS_MODEL";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Storage key of the goal state document.
pub const DEFAULT_STORAGE_KEY: &str = "calorie_goal_state";

/// Credentials and endpoint of the vision service.
#[derive(Clone)]
pub struct AnalysisConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnalysisConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        validate_api_key(&api_key)?;
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV).unwrap_or_default();
        let mut config = Self::new(api_key)?;

        if let Some(url) = lookup(BASE_URL_ENV).filter(|s| !s.trim().is_empty()) {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|s| !s.trim().is_empty()) {
            config.model = model;
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// Template .env files ship with masked keys like "sk-***"
fn validate_api_key(key: &str) -> Result<()> {
    if key.trim().is_empty() || key.contains("***") {
        return Err(Error::Configuration(format!(
            "{} is not set; add it to the environment or a .env file",
            API_KEY_ENV
        )));
    }
    Ok(())
}

/// Where the goal store keeps its document and how it seeds a fresh state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub storage_key: String,
    pub default_base_goal: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            default_base_goal: DEFAULT_BASE_GOAL,
        }
    }
}
