use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{ExerciseRecord, TestCase};

/// Minimum trimmed input length for a generated case.
pub const MIN_GENERATED_INPUT_CHARS: usize = 10;
/// Minimum trimmed output length for a generated case.
pub const MIN_GENERATED_OUTPUT_CHARS: usize = 2;

const ELISION_MARKERS: &[&str] = &["...", "…", "⋯"];

static REPEATED_NOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[(（]\s*(?:重复|repeat(?:ed|s)?\b|省略|omitted)").expect("Invalid repeated-note regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectReason {
    Elision,
    RepeatedNote,
    FullWidthParenthesis,
    TooShort,
    EmptyOutput,
}

/// Non-fatal finding about one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub index: usize,
    pub reason: DefectReason,
}

fn text_defect(text: &str) -> Option<DefectReason> {
    if ELISION_MARKERS.iter().any(|m| text.contains(m)) {
        Some(DefectReason::Elision)
    } else if REPEATED_NOTE_RE.is_match(text) {
        Some(DefectReason::RepeatedNote)
    } else if text.contains('（') || text.contains('）') {
        Some(DefectReason::FullWidthParenthesis)
    } else {
        None
    }
}

/// Why `case` is defective, if it is.
pub fn case_defect(case: &TestCase) -> Option<DefectReason> {
    if let Some(reason) = text_defect(&case.input).or_else(|| text_defect(&case.expected_output)) {
        return Some(reason);
    }
    let input = case.input.trim();
    let output = case.expected_output.trim();
    if output.is_empty() {
        return Some(DefectReason::EmptyOutput);
    }
    if case.is_ai_generated
        && (input.chars().count() < MIN_GENERATED_INPUT_CHARS
            || output.chars().count() < MIN_GENERATED_OUTPUT_CHARS)
    {
        return Some(DefectReason::TooShort);
    }
    None
}

/// Indices of defective cases, ascending.
pub fn detect_defective(cases: &[TestCase]) -> Vec<usize> {
    cases
        .iter()
        .enumerate()
        .filter(|(_, c)| case_defect(c).is_some())
        .map(|(i, _)| i)
        .collect()
}

pub fn has_issues(cases: &[TestCase]) -> bool {
    cases.iter().any(|c| case_defect(c).is_some())
}

pub fn validate(record: &ExerciseRecord) -> Vec<ValidationWarning> {
    record
        .test_cases
        .iter()
        .enumerate()
        .filter_map(|(index, c)| case_defect(c).map(|reason| ValidationWarning { index, reason }))
        .collect()
}
