/// Token counting utilities

use crate::dispatch::wire::ChatMessage;
use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Priming tokens the completion API adds for the assistant reply.
const REPLY_PRIMING_TOKENS: usize = 3;
/// Per-message overhead used when falling back to the heuristic.
const FALLBACK_MESSAGE_OVERHEAD: usize = 4;
/// Rough approximation: 1 token ≈ 4 characters of English text.
const CHARS_PER_TOKEN: usize = 4;

/// Maps text to a token count for one model.
pub trait Encoder: Send + Sync {
    fn encode_len(&self, text: &str) -> Result<usize>;
}

/// Builds the encoder for a model id. Construction may be expensive.
pub trait EncoderFactory: Send + Sync {
    fn build(&self, model: &str) -> Result<Arc<dyn Encoder>>;
}

struct BpeEncoder {
    bpe: CoreBPE,
}

impl Encoder for BpeEncoder {
    fn encode_len(&self, text: &str) -> Result<usize> {
        Ok(self.bpe.encode_ordinary(text).len())
    }
}

/// BPE encoders from `tiktoken-rs`; unknown models get `cl100k_base`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiktokenFactory;

impl EncoderFactory for TiktokenFactory {
    fn build(&self, model: &str) -> Result<Arc<dyn Encoder>> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                warn!(model, error = %e, "No encoding for model, using cl100k_base");
                tiktoken_rs::cl100k_base().map_err(|e| EngineError::Encoding(e.to_string()))?
            }
        };
        Ok(Arc::new(BpeEncoder { bpe }))
    }
}

/// Memoizes one encoder per model id.
///
/// Concurrent first use of the same model builds the encoder once; later
/// lookups only take the read lock.
pub struct EncoderCache {
    factory: Arc<dyn EncoderFactory>,
    encoders: RwLock<HashMap<String, Arc<dyn Encoder>>>,
}

impl EncoderCache {
    pub fn new(factory: Arc<dyn EncoderFactory>) -> Self {
        Self {
            factory,
            encoders: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_build(&self, model: &str) -> Result<Arc<dyn Encoder>> {
        {
            let encoders = self
                .encoders
                .read()
                .map_err(|_| EngineError::Encoding("encoder cache poisoned".to_string()))?;
            if let Some(encoder) = encoders.get(model) {
                return Ok(Arc::clone(encoder));
            }
        }

        let mut encoders = self
            .encoders
            .write()
            .map_err(|_| EngineError::Encoding("encoder cache poisoned".to_string()))?;
        // Another caller may have built it while we waited for the write lock.
        if let Some(encoder) = encoders.get(model) {
            return Ok(Arc::clone(encoder));
        }

        let encoder = self.factory.build(model)?;
        encoders.insert(model.to_string(), Arc::clone(&encoder));
        Ok(encoder)
    }

    pub fn len(&self) -> usize {
        self.encoders.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct TokenCounter {
    cache: EncoderCache,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::with_factory(Arc::new(TiktokenFactory))
    }

    pub fn with_factory(factory: Arc<dyn EncoderFactory>) -> Self {
        Self {
            cache: EncoderCache::new(factory),
        }
    }

    pub fn cache(&self) -> &EncoderCache {
        &self.cache
    }

    /// Token count of `text` for `model`. Blank text is 0 without touching an encoder.
    pub fn count(&self, text: &str, model: &str) -> usize {
        if text.trim().is_empty() {
            return 0;
        }

        match self.cache.get_or_build(model).and_then(|e| e.encode_len(text)) {
            Ok(count) => count,
            Err(e) => {
                warn!(model, error = %e, "Token counting failed, using fallback");
                heuristic_count(text)
            }
        }
    }

    /// Token count of a request payload, including the per-message framing
    /// the completion API charges for.
    pub fn count_sequence(&self, messages: &[ChatMessage], model: &str) -> usize {
        if messages.is_empty() {
            return 0;
        }

        match self.encode_sequence(messages, model) {
            Ok(count) => count,
            Err(e) => {
                warn!(model, error = %e, "Chat token counting failed, using fallback");
                heuristic_sequence_count(messages)
            }
        }
    }

    fn encode_sequence(&self, messages: &[ChatMessage], model: &str) -> Result<usize> {
        let encoder = self.cache.get_or_build(model)?;
        let per_message = message_overhead_for_model(model);

        let mut total = 0;
        for message in messages {
            total += per_message;
            total += encoder.encode_len(message.role.as_str())?;
            total += encoder.encode_len(&message.content)?;
        }

        Ok(total + REPLY_PRIMING_TOKENS)
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Framing tokens per message; newer model families charge one less.
pub fn message_overhead_for_model(model: &str) -> usize {
    match model {
        "gpt-4" | "gpt-4-1106-preview" | "gpt-4o" => 3,
        _ => 4,
    }
}

pub fn heuristic_count(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn heuristic_sequence_count(messages: &[ChatMessage]) -> usize {
    let body: usize = messages
        .iter()
        .map(|m| {
            heuristic_count(m.role.as_str()) + heuristic_count(&m.content) + FALLBACK_MESSAGE_OVERHEAD
        })
        .sum();
    body + REPLY_PRIMING_TOKENS
}
