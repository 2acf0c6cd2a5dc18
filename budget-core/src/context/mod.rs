pub mod manager;
pub mod settlement;
pub mod storage;
pub mod token_counter;
pub mod window;

pub use manager::{ContextManager, ConversationUsage, Exchange};
pub use settlement::Settlement;
pub use storage::{ConversationStore, InMemoryStore};
pub use token_counter::TokenCounter;
pub use window::{ContextWindowSelector, WindowDiagnostics, WindowSelection};

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a conversation.
///
/// Token fields stay `None` until counted. Once set they are role-exclusive:
/// a user turn only carries input tokens, an assistant turn only output tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
    input_tokens: Option<usize>,
    output_tokens: Option<usize>,
    total_tokens: Option<usize>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "turn content must not be empty".to_string(),
            ));
        }

        Ok(Self {
            role,
            content,
            created_at: Utc::now(),
            input_tokens: None,
            output_tokens: None,
            total_tokens: None,
        })
    }

    pub fn user(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn input_tokens(&self) -> Option<usize> {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> Option<usize> {
        self.output_tokens
    }

    pub fn total_tokens(&self) -> Option<usize> {
        self.total_tokens
    }

    pub fn is_counted(&self) -> bool {
        self.total_tokens.is_some()
    }

    /// Stores `count` on the side of the ledger that matches the role.
    pub fn record_token_count(&mut self, count: usize) {
        let (input, output) = match self.role {
            Role::User => (count, 0),
            Role::Assistant => (0, count),
        };
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self.total_tokens = Some(count);
    }

    /// Counts the content locally unless a count is already recorded.
    pub fn ensure_token_count(&mut self, counter: &TokenCounter, model: &str) -> usize {
        if let Some(total) = self.total_tokens {
            return total;
        }
        let count = counter.count(&self.content, model);
        self.record_token_count(count);
        count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    turns: Vec<Turn>,
    total_input_tokens: usize,
    total_output_tokens: usize,
    total_tokens: usize,
    model_used: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            turns: Vec::new(),
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_tokens: 0,
            model_used: None,
        }
    }

    /// Turns in chronological order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn push_turn(&mut self, turn: Turn) -> &mut Turn {
        self.turns.push(turn);
        let last = self.turns.len() - 1;
        &mut self.turns[last]
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Result<&mut Turn> {
        Ok(self.push_turn(Turn::user(content)?))
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> Result<&mut Turn> {
        Ok(self.push_turn(Turn::assistant(content)?))
    }

    pub fn last_turn_mut(&mut self, role: Role) -> Option<&mut Turn> {
        self.turns.iter_mut().rev().find(|turn| turn.role == role)
    }

    pub fn total_input_tokens(&self) -> usize {
        self.total_input_tokens
    }

    pub fn total_output_tokens(&self) -> usize {
        self.total_output_tokens
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn model_used(&self) -> Option<&str> {
        self.model_used.as_deref()
    }

    pub fn set_model_used(&mut self, model: impl Into<String>) {
        self.model_used = Some(model.into());
    }

    /// Re-derives the aggregate totals from the turns. Uncounted turns add nothing.
    pub fn recompute_totals(&mut self) {
        let input: usize = self.turns.iter().filter_map(|t| t.input_tokens).sum();
        let output: usize = self.turns.iter().filter_map(|t| t.output_tokens).sum();
        self.total_input_tokens = input;
        self.total_output_tokens = output;
        self.total_tokens = input + output;
    }

    /// Sets the title from the first user turn when none is set yet.
    pub fn derive_title(&mut self) -> Option<&str> {
        if self.title.is_none() {
            let first_user = self.turns.iter().find(|t| t.role == Role::User)?;
            self.title = Some(truncate_title(first_user.content()));
        }
        self.title.as_deref()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_title(content: &str) -> String {
    const OMISSION: &str = "...";
    if content.chars().count() <= TITLE_MAX_CHARS {
        return content.to_string();
    }
    let keep = TITLE_MAX_CHARS - OMISSION.len();
    let mut title: String = content.chars().take(keep).collect();
    title.push_str(OMISSION);
    title
}
