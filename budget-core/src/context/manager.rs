use super::settlement::Settlement;
use super::storage::ConversationStore;
use super::window::WindowDiagnostics;
use super::Conversation;
use crate::cost::{CostBreakdown, CostEstimator};
use crate::dispatch::{CompletionDispatcher, CompletionOutcome};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Result of one user message: the reply outcome plus the settled conversation.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub outcome: CompletionOutcome,
    pub conversation: Conversation,
    pub cost: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationUsage {
    pub conversation_id: String,
    pub title: Option<String>,
    pub turn_count: usize,
    pub total_tokens: usize,
    pub total_input_tokens: usize,
    pub total_output_tokens: usize,
    pub model_used: String,
    pub token_limits: WindowDiagnostics,
    pub cost_estimate: CostBreakdown,
}

pub struct ContextManager<S: ConversationStore> {
    storage: S,
    dispatcher: CompletionDispatcher,
    settlement: Settlement,
    estimator: Arc<CostEstimator>,
}

impl<S: ConversationStore> ContextManager<S> {
    pub fn new(storage: S, dispatcher: CompletionDispatcher) -> Self {
        let estimator = Arc::new(CostEstimator::new(Arc::clone(dispatcher.registry())));
        let settlement = Settlement::new(Arc::clone(dispatcher.token_counter()), Arc::clone(&estimator));
        Self {
            storage,
            dispatcher,
            settlement,
            estimator,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn get_or_create_conversation(
        &self,
        conversation_id: Option<String>,
    ) -> Result<Conversation> {
        if let Some(id) = conversation_id {
            if let Some(conversation) = self.storage.load(&id).await? {
                return Ok(conversation);
            }
        }

        let conversation = Conversation::new();
        self.storage.save(&conversation).await?;
        Ok(conversation)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.storage.load(conversation_id).await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        self.storage.delete(conversation_id).await
    }

    /// Appends a user message, dispatches, stores the reply and settles tokens.
    ///
    /// Failed dispatches still produce an assistant turn carrying the
    /// user-facing message, but leave the token totals as they were; only
    /// storage and input errors are returned.
    pub async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Exchange> {
        let mut conversation = self
            .storage
            .load(conversation_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("conversation {}", conversation_id)))?;

        conversation.push_user(content)?;
        let model = self.dispatcher.model().to_string();

        let outcome = self.dispatcher.dispatch(&mut conversation).await;
        if !outcome.is_success() {
            warn!(
                conversation_id,
                status = outcome.status.label(),
                "Dispatch produced a fallback reply"
            );
        }

        let cost = self.settlement.settle(&mut conversation, &outcome, &model)?;
        if conversation.len() == 2 {
            conversation.derive_title();
        }

        self.storage.save(&conversation).await?;

        Ok(Exchange {
            outcome,
            conversation,
            cost,
        })
    }

    pub async fn usage_report(&self, conversation_id: &str) -> Result<ConversationUsage> {
        let conversation = self
            .storage
            .load(conversation_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("conversation {}", conversation_id)))?;

        let model_used = conversation
            .model_used()
            .unwrap_or(self.dispatcher.model())
            .to_string();

        Ok(ConversationUsage {
            conversation_id: conversation.id.clone(),
            title: conversation.title.clone(),
            turn_count: conversation.len(),
            total_tokens: conversation.total_tokens(),
            total_input_tokens: conversation.total_input_tokens(),
            total_output_tokens: conversation.total_output_tokens(),
            token_limits: self.dispatcher.window_diagnostics(&conversation, None),
            cost_estimate: self
                .estimator
                .estimate_conversation(&conversation, Some(self.dispatcher.model())),
            model_used,
        })
    }
}
