pub mod adapter;
pub mod client;
pub mod ollama;
pub mod payload;
pub mod prompt;
pub mod repair;
pub mod sanitize;

pub use adapter::*;
pub use client::*;
pub use ollama::*;
pub use payload::*;
pub use repair::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Text-generation service is not reachable at {0}")]
    Connection(String),

    #[error("Service returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No response within {0}s")]
    Timeout(u64),

    #[error("Request aborted")]
    Aborted,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}
