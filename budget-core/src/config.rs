use crate::dispatch::client::DEFAULT_BASE_URL;
use crate::error::Result;
use crate::registry::{ModelProfile, ModelRegistry, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

pub const MODEL_ENV: &str = "OPENAI_MODEL";
pub const API_KEY_ENV: &str = "OPENAI_ACCESS_TOKEN";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Engine settings, usually read from a TOML file.
///
/// ```toml
/// default_model = "gpt-4o"
/// request_timeout_secs = 30
///
/// [[models]]
/// id = "gpt-4o"
/// max_context_tokens = 128000
/// temperature = 0.7
/// reserved_response_tokens = 1000
/// price_per_1k_input = 0.005
/// price_per_1k_output = 0.015
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_base_url")]
    pub api_base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Replaces the built-in model table when non-empty.
    #[serde(default)]
    pub models: Vec<ModelProfile>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            api_base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_timeout_secs(),
            models: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&content)
    }

    /// Applies `OPENAI_MODEL` and `OPENAI_ACCESS_TOKEN` when set.
    pub fn with_env(self) -> Self {
        let model = std::env::var(MODEL_ENV).ok();
        let api_key = std::env::var(API_KEY_ENV).ok();
        self.with_overrides(model, api_key)
    }

    pub fn with_overrides(mut self, model: Option<String>, api_key: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.default_model = model;
        }
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Built-in table unless profiles are configured. An unknown default model
    /// is only an error for a configured table; the built-in one degrades.
    pub fn registry(&self) -> Result<ModelRegistry> {
        if self.models.is_empty() {
            let builtin = ModelRegistry::new();
            if builtin.contains(&self.default_model) {
                return ModelRegistry::with_profiles(
                    crate::registry::builtin_profiles(),
                    &self.default_model,
                );
            }
            return Ok(builtin);
        }
        ModelRegistry::with_profiles(self.models.clone(), &self.default_model)
    }
}
