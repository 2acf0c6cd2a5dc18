pub mod config;
pub mod context;
pub mod cost;
pub mod dispatch;
pub mod error;
pub mod observability;
pub mod registry;

pub use config::EngineConfig;
pub use context::{ContextManager, ContextWindowSelector, Conversation, Role, TokenCounter, Turn};
pub use cost::{CostBreakdown, CostEstimator};
pub use dispatch::{CompletionDispatcher, CompletionOutcome, DispatchStatus, FailureKind};
pub use error::{EngineError, Result};
pub use registry::{ModelProfile, ModelRegistry};
