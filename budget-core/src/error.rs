use thiserror::Error;
use reqwest::Error as ReqwestError;
use serde_json::Error as JsonError;
use std::io::Error as IoError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] JsonError),

    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Unknown(err.to_string())
    }
}

impl EngineError {
    /// True when the error text reports a context-window overflow.
    pub fn mentions_context_length(&self) -> bool {
        let text = self.to_string();
        text.contains("context_length_exceeded") || text.contains("maximum context length")
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
