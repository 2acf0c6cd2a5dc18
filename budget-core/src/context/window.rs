/// Context window management

use crate::context::token_counter::TokenCounter;
use crate::context::{Conversation, Role, Turn};
use crate::registry::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Turns chosen for one outbound request, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSelection<'a> {
    pub turns: Vec<&'a Turn>,
    pub total_tokens: usize,
    /// Set when nothing fit and the earliest user turn was included anyway.
    pub forced: bool,
}

impl WindowSelection<'_> {
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDiagnostics {
    pub model: String,
    pub token_limit: usize,
    pub available_for_history: usize,
    pub current_usage: usize,
    pub within_limit: bool,
    pub turn_count: usize,
    pub selected_turn_count: usize,
}

pub struct ContextWindowSelector {
    token_counter: Arc<TokenCounter>,
}

impl ContextWindowSelector {
    pub fn new(token_counter: Arc<TokenCounter>) -> Self {
        Self { token_counter }
    }

    fn turn_cost(&self, turn: &Turn, model: &str) -> usize {
        turn.total_tokens()
            .unwrap_or_else(|| self.token_counter.count(turn.content(), model))
    }

    /// Selects the longest run of most recent turns whose cost fits `budget`.
    ///
    /// The walk stops at the first turn that does not fit, so the result is
    /// always a contiguous suffix. When even the newest turn is too large the
    /// earliest user turn is sent alone, whatever its cost.
    pub fn select<'a>(&self, turns: &'a [Turn], budget: usize, model: &str) -> WindowSelection<'a> {
        let mut selected = Vec::new();
        let mut running_total = 0;

        for turn in turns.iter().rev() {
            let cost = self.turn_cost(turn, model);
            if running_total + cost > budget {
                break;
            }
            selected.push(turn);
            running_total += cost;
        }
        selected.reverse();

        if selected.is_empty() {
            // Earliest user turn, not the latest.
            if let Some(turn) = turns.iter().find(|t| t.role() == Role::User) {
                let cost = self.turn_cost(turn, model);
                return WindowSelection {
                    turns: vec![turn],
                    total_tokens: cost,
                    forced: true,
                };
            }
        }

        WindowSelection {
            turns: selected,
            total_tokens: running_total,
            forced: false,
        }
    }

    /// Window usage for a conversation against the model's history budget.
    pub fn diagnose(
        &self,
        conversation: &Conversation,
        registry: &ModelRegistry,
        model: Option<&str>,
    ) -> WindowDiagnostics {
        let profile = registry.profile_for(model);
        let model = model.unwrap_or(profile.id.as_str());
        let available = profile.available_for_history();
        let selection = self.select(conversation.turns(), available, model);

        WindowDiagnostics {
            model: model.to_string(),
            token_limit: profile.max_context_tokens,
            available_for_history: available,
            current_usage: selection.total_tokens,
            within_limit: selection.total_tokens <= available,
            turn_count: conversation.len(),
            selected_turn_count: selection.len(),
        }
    }
}
