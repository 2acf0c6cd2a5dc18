use super::wire::{ChatRequest, ChatResponse};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use reqwest::Client;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Transport to a chat-completion API.
///
/// Structured API errors come back as `Ok` with `ChatResponse::error` set;
/// `Err` is reserved for transport and decoding faults.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        // Error statuses usually carry a structured `error` body worth classifying.
        serde_json::from_str::<ChatResponse>(&text).map_err(|e| {
            EngineError::MalformedResponse(format!("HTTP {}: {} ({})", status, text, e))
        })
    }
}
