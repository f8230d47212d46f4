use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::enums::{Difficulty, QuestionType};

/// One programming exercise as stored in a bank (one JSON file per record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecord {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(rename = "type", default)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_answer: Option<String>,
}

/// A single input/expected-output pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    #[serde(rename = "output", default)]
    pub expected_output: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "isAIGenerated", default)]
    pub is_ai_generated: bool,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            description: String::new(),
            is_ai_generated: false,
        }
    }

    pub fn generated(mut self) -> Self {
        self.is_ai_generated = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl ExerciseRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            question_type: QuestionType::default(),
            difficulty: Difficulty::default(),
            tags: Vec::new(),
            description: String::new(),
            options: Vec::new(),
            test_cases: Vec::new(),
            reference_answer: None,
        }
    }

    /// Records without a usable title are discarded before persistence.
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Add a tag unless it is blank or already present (case-sensitive).
    pub fn push_tag(&mut self, tag: &str) {
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn generated_case_count(&self) -> usize {
        self.test_cases.iter().filter(|c| c.is_ai_generated).count()
    }
}

/// Positional case label: "basic" first, "boundary" last, "case N" in between.
pub fn positional_case_description(position: usize, total: usize) -> String {
    if position == 1 {
        "basic".to_string()
    } else if position == total {
        "boundary".to_string()
    } else {
        format!("case {position}")
    }
}

/// Stable record id from chunk identity, in-chunk sequence and a title hash.
///
/// Same source + chunk + sequence + title always yields the same id, so a
/// re-import of an unchanged document reproduces the same ids.
pub fn question_id(source_name: &str, chunk_index: usize, sequence: usize, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    hasher.update([0x1f]);
    hasher.update(chunk_index.to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update([0x1f]);
    hasher.update(title.trim().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("q-{hex}")
}
