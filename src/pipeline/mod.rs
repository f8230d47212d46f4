pub mod chunker;
pub mod heuristic;
pub mod import;
pub mod service;
pub mod testcases;

pub use chunker::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::bank::StorageError;
use service::LlmError;

/// Pipeline error taxonomy. Every variant except `NoInput` and `Cancelled`
/// is scoped to one chunk or one record and never aborts a run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Chunk extraction failed: {0}")]
    ChunkExtraction(#[from] LlmError),

    #[error("Malformed structure: {0}")]
    MalformedStructure(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("No exercises found")]
    NoInput,

    #[error("Import cancelled")]
    Cancelled,
}

impl IngestError {
    /// Connection-level service failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChunkExtraction(e) if e.is_retryable())
    }
}

/// Cooperative cancellation shared between the caller, the orchestrator and
/// any in-flight service worker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn only_connection_failures_are_retryable() {
        let conn = IngestError::ChunkExtraction(LlmError::Connection("http://x".into()));
        let status = IngestError::ChunkExtraction(LlmError::Service {
            status: 500,
            body: "boom".into(),
        });
        assert!(conn.is_retryable());
        assert!(!status.is_retryable());
        assert!(!IngestError::MalformedStructure("x".into()).is_retryable());
        assert!(!IngestError::Cancelled.is_retryable());
    }

    #[test]
    fn no_input_message() {
        assert_eq!(IngestError::NoInput.to_string(), "No exercises found");
    }
}
