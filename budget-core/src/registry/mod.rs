pub mod profiles;

pub use profiles::{builtin_profiles, DEFAULT_MODEL};

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capability profile of one completion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub id: String,
    pub max_context_tokens: usize,
    pub temperature: f32,
    pub reserved_response_tokens: usize,
    pub price_per_1k_input: f64,
    pub price_per_1k_output: f64,
}

impl ModelProfile {
    /// Tokens left for conversation history once the response reserve is held back.
    pub fn available_for_history(&self) -> usize {
        self.max_context_tokens.saturating_sub(self.reserved_response_tokens)
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidConfig("model id must not be empty".to_string()));
        }
        if self.max_context_tokens == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "{}: max_context_tokens must be positive",
                self.id
            )));
        }
        if self.reserved_response_tokens == 0
            || self.reserved_response_tokens >= self.max_context_tokens
        {
            return Err(EngineError::InvalidConfig(format!(
                "{}: reserved_response_tokens must be in 1..{}",
                self.id, self.max_context_tokens
            )));
        }
        if self.price_per_1k_input < 0.0 || self.price_per_1k_output < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "{}: prices must not be negative",
                self.id
            )));
        }
        Ok(())
    }
}

/// Read-only lookup from model id to [`ModelProfile`].
///
/// Lookups never fail: an unset or unknown id resolves to the default
/// model's profile so a typo in a request cannot break the request path.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    profiles: HashMap<String, ModelProfile>,
    default_profile: ModelProfile,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let profiles: HashMap<String, ModelProfile> = builtin_profiles()
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();
        let default_profile = profiles
            .get(DEFAULT_MODEL)
            .cloned()
            .unwrap_or_else(|| builtin_profiles().remove(0));

        Self {
            profiles,
            default_profile,
        }
    }

    /// Builds a registry from configured profiles.
    pub fn with_profiles(profiles: Vec<ModelProfile>, default_model: &str) -> Result<Self> {
        let mut table = HashMap::new();
        for profile in profiles {
            profile.validate()?;
            if table.insert(profile.id.clone(), profile).is_some() {
                return Err(EngineError::InvalidConfig(
                    "duplicate model id in profile list".to_string(),
                ));
            }
        }

        let default_profile = table.get(default_model).cloned().ok_or_else(|| {
            EngineError::InvalidConfig(format!(
                "default model {} has no profile",
                default_model
            ))
        })?;

        Ok(Self {
            profiles: table,
            default_profile,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_profile.id
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.profiles.contains_key(model_id)
    }

    pub fn profile_for(&self, model_id: Option<&str>) -> &ModelProfile {
        model_id
            .and_then(|id| self.profiles.get(id))
            .unwrap_or(&self.default_profile)
    }

    pub fn available_context_for_history(&self, model_id: Option<&str>) -> usize {
        self.profile_for(model_id).available_for_history()
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
