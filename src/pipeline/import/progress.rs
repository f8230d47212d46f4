use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::testcases::ValidationWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Idle,
    Scanning,
    Dispatching,
    AwaitingResponse,
    Applying,
    Finalizing,
    Completed,
    Cancelled,
}

/// Run-scoped counters, published after every unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub run_id: Uuid,
    pub total_files: usize,
    pub processed_files: usize,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub failed_chunks: usize,
    pub extracted: usize,
    pub current_file: Option<String>,
    pub phase: ImportPhase,
    pub status: String,
}

impl ImportProgress {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            total_files: 0,
            processed_files: 0,
            total_chunks: 0,
            processed_chunks: 0,
            failed_chunks: 0,
            extracted: 0,
            current_file: None,
            phase: ImportPhase::Idle,
            status: String::new(),
        }
    }

    pub fn set_phase(&mut self, phase: ImportPhase, status: impl Into<String>) {
        self.phase = phase;
        self.status = status.into();
    }

    /// Chunk completion as a percentage.
    pub fn percent(&self) -> u8 {
        if self.total_chunks == 0 {
            return 0;
        }
        let pct = self.processed_chunks.min(self.total_chunks) * 100 / self.total_chunks;
        u8::try_from(pct).unwrap_or(100)
    }
}

/// Final result of an import run. `success` means at least one record was
/// persisted and the run was not cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub success: bool,
    pub message: String,
    pub extracted: usize,
    pub cancelled: bool,
    pub failed_chunks: usize,
    /// Test-case validation warnings across all persisted records.
    pub warnings: usize,
    pub errors: Vec<String>,
}

impl ImportOutcome {
    pub fn no_input() -> Self {
        Self {
            success: false,
            message: "No exercises found".to_string(),
            extracted: 0,
            cancelled: false,
            failed_chunks: 0,
            warnings: 0,
            errors: Vec::new(),
        }
    }
}

/// Event stream of an import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    Started {
        run_id: Uuid,
        total_files: usize,
        total_chunks: usize,
    },
    Progress(ImportProgress),
    /// The service has not answered a chunk yet; advisory only.
    LongRunning {
        chunk: String,
        elapsed_secs: u64,
    },
    /// A persisted record carries defective test cases.
    ValidationWarnings {
        title: String,
        warnings: Vec<ValidationWarning>,
    },
    Finished(ImportOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_bounded() {
        let mut p = ImportProgress::new(Uuid::new_v4());
        assert_eq!(p.percent(), 0);
        p.total_chunks = 4;
        p.processed_chunks = 1;
        assert_eq!(p.percent(), 25);
        p.processed_chunks = 9;
        assert_eq!(p.percent(), 100);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let mut p = ImportProgress::new(Uuid::nil());
        p.set_phase(ImportPhase::AwaitingResponse, "waiting");
        let json = serde_json::to_string(&ImportEvent::Progress(p)).unwrap();
        assert!(json.contains("\"type\":\"Progress\""));
        assert!(json.contains("\"phase\":\"awaiting_response\""));
        assert!(json.contains("\"processedChunks\":0"));
    }

    #[test]
    fn no_input_outcome() {
        let o = ImportOutcome::no_input();
        assert!(!o.success);
        assert_eq!(o.message, "No exercises found");
    }
}
