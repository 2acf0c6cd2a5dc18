pub mod client;
pub mod outcome;
pub mod wire;

pub use client::{CompletionClient, OpenAiClient};
pub use outcome::{CompletionOutcome, DispatchStatus, FailureKind, TokenUsage};
pub use wire::{ChatMessage, ChatRequest, ChatResponse};

use crate::config::EngineConfig;
use crate::context::window::{ContextWindowSelector, WindowDiagnostics};
use crate::context::{Conversation, TokenCounter};
use crate::cost::CostEstimator;
use crate::error::{EngineError, Result};
use crate::observability::DispatchMetrics;
use crate::registry::{ModelProfile, ModelRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smallest response budget ever requested.
pub const MIN_RESPONSE_TOKENS: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds a token-bounded request from a conversation, sends it and turns
/// whatever comes back into a [`CompletionOutcome`].
///
/// Dispatch never returns an error: rejected requests, transport faults and
/// timeouts all become outcomes carrying a user-facing message.
pub struct CompletionDispatcher {
    registry: Arc<ModelRegistry>,
    token_counter: Arc<TokenCounter>,
    selector: ContextWindowSelector,
    estimator: CostEstimator,
    client: Arc<dyn CompletionClient>,
    model: String,
    timeout: Duration,
    metrics: Option<DispatchMetrics>,
}

impl CompletionDispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        token_counter: Arc<TokenCounter>,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            model: registry.default_model().to_string(),
            selector: ContextWindowSelector::new(Arc::clone(&token_counter)),
            estimator: CostEstimator::new(Arc::clone(&registry)),
            registry,
            token_counter,
            client,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            metrics: None,
        }
    }

    /// Dispatcher talking to the configured OpenAI-compatible endpoint.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            EngineError::InvalidConfig("no API key configured".to_string())
        })?;
        let client = OpenAiClient::new(api_key).with_base_url(config.api_base_url.clone());
        let registry = Arc::new(config.registry()?);

        Ok(Self::new(registry, Arc::new(TokenCounter::new()), Arc::new(client))
            .with_model(config.default_model.clone())
            .with_timeout(config.request_timeout()))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn token_counter(&self) -> &Arc<TokenCounter> {
        &self.token_counter
    }

    pub fn estimator(&self) -> &CostEstimator {
        &self.estimator
    }

    /// Sends the conversation's fitting history and records the model used on success.
    /// Token totals are left to the caller.
    pub async fn dispatch(&self, conversation: &mut Conversation) -> CompletionOutcome {
        let started = Instant::now();
        let outcome = self.run(conversation).await;

        if let Some(metrics) = &self.metrics {
            let cost = outcome
                .usage
                .map(|u| self.estimator.estimate(u.input_tokens, u.output_tokens, Some(&self.model)));
            metrics.record(&outcome, cost.as_ref(), started.elapsed());
        }

        outcome
    }

    async fn run(&self, conversation: &mut Conversation) -> CompletionOutcome {
        let profile = self.registry.profile_for(Some(&self.model));
        let available = profile.available_for_history();

        let messages: Vec<ChatMessage> = {
            let selection = self.selector.select(conversation.turns(), available, &self.model);
            if selection.is_empty() {
                crate::log_dispatch!(warn, conversation.id, "No messages available after token trimming");
                return CompletionOutcome::rejected(FailureKind::EmptySelection);
            }
            if selection.len() < conversation.len() {
                crate::log_dispatch!(
                    info,
                    conversation.id,
                    trimmed = conversation.len() - selection.len(),
                    forced = selection.forced,
                    "Trimmed messages to fit token limit"
                );
            }
            selection.turns.iter().map(|turn| ChatMessage::from(*turn)).collect()
        };

        let input_tokens = self.token_counter.count_sequence(&messages, &self.model);
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: profile.temperature,
            max_tokens: response_token_ceiling(profile, input_tokens),
        };

        crate::log_dispatch!(
            info,
            conversation.id,
            input_tokens,
            max_tokens = request.max_tokens,
            model = %self.model,
            "Sending completion request"
        );

        let response = match tokio::time::timeout(self.timeout, self.client.complete(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return self.transport_failure(&conversation.id, e),
            Err(_) => {
                let e = EngineError::Timeout(format!(
                    "completion request exceeded {:?}",
                    self.timeout
                ));
                return self.transport_failure(&conversation.id, e);
            }
        };

        if let Some(error) = &response.error {
            let kind = FailureKind::from_api_error(error);
            crate::log_dispatch!(
                error,
                conversation.id,
                error_type = error.error_type(),
                error_message = %error.message,
                kind = kind.as_str(),
                "Completion API error"
            );
            return CompletionOutcome::rejected(kind);
        }

        let content = match response.content() {
            Some(content) if !content.trim().is_empty() => content.to_string(),
            _ => {
                let e = EngineError::MalformedResponse("response carries no content".to_string());
                return self.transport_failure(&conversation.id, e);
            }
        };

        conversation.set_model_used(self.model.clone());

        match response.usage {
            Some(usage) => {
                crate::log_dispatch!(
                    info,
                    conversation.id,
                    input = usage.prompt_tokens,
                    output = usage.completion_tokens,
                    total = usage.total_tokens,
                    "API returned usage"
                );
                CompletionOutcome::succeeded(content, usage.into())
            }
            None => {
                let output_tokens = self.token_counter.count(&content, &self.model);
                crate::log_dispatch!(
                    info,
                    conversation.id,
                    input_tokens,
                    output_tokens,
                    "API omitted usage, using local estimate"
                );
                CompletionOutcome::degraded(content, TokenUsage::new(input_tokens, output_tokens))
            }
        }
    }

    fn transport_failure(&self, conversation_id: &str, error: EngineError) -> CompletionOutcome {
        let kind = FailureKind::from_transport_error(&error);
        crate::log_dispatch!(
            error,
            conversation_id,
            error = %error,
            kind = kind.as_str(),
            "Completion service error"
        );
        CompletionOutcome::failed(kind)
    }

    /// Limit report for clients; defaults to the dispatcher's model.
    pub fn window_diagnostics(
        &self,
        conversation: &Conversation,
        model: Option<&str>,
    ) -> WindowDiagnostics {
        let model = model.unwrap_or(self.model.as_str());
        self.selector.diagnose(conversation, &self.registry, Some(model))
    }
}

/// Response budget for a request of `input_tokens`: the reserve, shrunk when
/// headroom is tight, never below [`MIN_RESPONSE_TOKENS`] and never above the reserve.
pub fn response_token_ceiling(profile: &ModelProfile, input_tokens: usize) -> usize {
    let reserved = profile.reserved_response_tokens;
    let headroom = profile
        .max_context_tokens
        .saturating_sub(input_tokens)
        .saturating_sub(reserved);

    headroom.min(reserved).max(MIN_RESPONSE_TOKENS).min(reserved)
}
