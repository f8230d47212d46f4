use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::{detect_defective, has_issues};
use crate::bank::{BankStore, StorageError};
use crate::models::{positional_case_description, ExerciseRecord, TestCase};
use crate::pipeline::service::prompt::{
    build_fix_prompt, build_supplement_prompt, TEST_CASE_SYSTEM_PROMPT,
};
use crate::pipeline::service::{cases_from_payload, generate_with_timeout, try_parse, LlmClient, Payload};
use crate::pipeline::{CancelFlag, IngestError};

/// Corrected data for one defective case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFix {
    pub index: usize,
    pub input: String,
    pub output: String,
}

pub fn build_fix_request(record: &ExerciseRecord, defective: &[usize]) -> String {
    build_fix_prompt(record, defective)
}

pub fn build_supplement_request(record: &ExerciseRecord, needed: usize) -> String {
    build_supplement_prompt(record, needed)
}

/// Read `{"fixes": [...]}` or a bare array of fixes. Entries without a
/// numeric index are skipped.
pub fn parse_fixes(value: &Value) -> Vec<CaseFix> {
    let root = Payload::new(value);
    let items = match value {
        Value::Array(items) => items.iter().map(Payload::new).collect(),
        _ => root.get_array_any(&["fixes", "testCases", "cases"]),
    };
    items
        .iter()
        .filter_map(|item| {
            let index = item.value().get("index")?.as_u64()?;
            Some(CaseFix {
                index: usize::try_from(index).ok()?,
                input: item.get_text("input", ""),
                output: item.get_text_any(&["output", "expectedOutput", "expected_output"], ""),
            })
        })
        .collect()
}

/// Replace defective cases with their fixes. Fixes for indices that are not
/// currently defective, or with empty data, are ignored.
pub fn apply_fix(record: &ExerciseRecord, fixes: &[CaseFix]) -> ExerciseRecord {
    let defective = detect_defective(&record.test_cases);
    let mut fixed = record.clone();
    for fix in fixes {
        if !defective.contains(&fix.index) || fix.output.trim().is_empty() {
            continue;
        }
        if let Some(case) = fixed.test_cases.get_mut(fix.index) {
            case.input = fix.input.trim().to_string();
            case.expected_output = fix.output.trim().to_string();
        }
    }
    fixed
}

/// Read supplementary cases; every one is marked generated.
pub fn parse_supplement(value: &Value) -> Vec<TestCase> {
    let root = Payload::new(value);
    let items = match value {
        Value::Array(items) => items.iter().map(Payload::new).collect(),
        _ => root.get_array_any(&["testCases", "test_cases", "cases"]),
    };
    cases_from_payload(&items, true)
        .into_iter()
        .map(TestCase::generated)
        .collect()
}

/// Append generated cases, skipping empty ones and inputs already present.
pub fn apply_supplement(record: &ExerciseRecord, cases: Vec<TestCase>) -> ExerciseRecord {
    let mut updated = record.clone();
    for case in cases {
        let input = case.input.trim();
        if case.expected_output.trim().is_empty()
            || updated.test_cases.iter().any(|c| c.input.trim() == input)
        {
            continue;
        }
        updated.test_cases.push(case.generated());
    }
    let total = updated.test_cases.len();
    for (i, case) in updated.test_cases.iter_mut().enumerate() {
        if case.description.trim().is_empty() {
            case.description = positional_case_description(i + 1, total);
        }
    }
    updated
}

/// What an inline improvement pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    pub supplemented: usize,
    pub fixed: usize,
}

/// Tops up thin records and regenerates defective cases through the
/// text-generation service.
pub struct TestCaseFixer {
    client: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
    min_test_cases: usize,
}

impl TestCaseFixer {
    pub fn new(client: Arc<dyn LlmClient>, model: &str, timeout: Duration, min_test_cases: usize) -> Self {
        Self {
            client,
            model: model.to_string(),
            timeout,
            min_test_cases,
        }
    }

    fn request(&self, prompt: &str) -> Result<Value, IngestError> {
        let raw = generate_with_timeout(&self.client, &self.model, prompt, TEST_CASE_SYSTEM_PROMPT, self.timeout)?;
        try_parse(&raw).map_err(|e| IngestError::MalformedStructure(e.reason))
    }

    pub fn supplement(&self, record: &ExerciseRecord) -> Result<ExerciseRecord, IngestError> {
        let needed = self.min_test_cases.saturating_sub(record.test_cases.len());
        if needed == 0 {
            return Ok(record.clone());
        }
        let value = self.request(&build_supplement_request(record, needed))?;
        Ok(apply_supplement(record, parse_supplement(&value)))
    }

    pub fn fix(&self, record: &ExerciseRecord) -> Result<ExerciseRecord, IngestError> {
        let defective = detect_defective(&record.test_cases);
        if defective.is_empty() {
            return Ok(record.clone());
        }
        let value = self.request(&build_fix_request(record, &defective))?;
        Ok(apply_fix(record, &parse_fixes(&value)))
    }

    /// Supplement then fix. Failures are logged and the record passes through
    /// with whatever was already improved.
    pub fn improve(&self, record: ExerciseRecord) -> (ExerciseRecord, FixReport) {
        let mut report = FixReport::default();
        let mut current = record;

        if current.test_cases.len() < self.min_test_cases {
            let before = current.test_cases.len();
            match self.supplement(&current) {
                Ok(updated) => {
                    report.supplemented = updated.test_cases.len() - before;
                    current = updated;
                }
                Err(e) => tracing::warn!(title = %current.title, error = %e, "Test case supplement failed"),
            }
        }

        if has_issues(&current.test_cases) {
            let before = detect_defective(&current.test_cases).len();
            match self.fix(&current) {
                Ok(updated) => {
                    report.fixed = before.saturating_sub(detect_defective(&updated.test_cases).len());
                    current = updated;
                }
                Err(e) => tracing::warn!(title = %current.title, error = %e, "Test case fix failed"),
            }
        }

        (current, report)
    }
}

/// Outcome of a batch pass over a persisted bank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFixReport {
    pub scanned: usize,
    pub with_issues: usize,
    pub fixed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Fix every record in `bank` that has defective cases, overwriting its
/// artifact. Cancellation is honored between records.
pub fn fix_bank(
    store: &BankStore,
    bank: &str,
    fixer: &TestCaseFixer,
    cancel: &CancelFlag,
    progress_fn: Option<&dyn Fn(usize, usize, &str)>,
) -> Result<BatchFixReport, StorageError> {
    let dir = store.checked_bank_dir(bank)?;
    if !dir.is_dir() {
        return Err(StorageError::BankNotFound(dir));
    }
    let entries = store.load_records(bank)?;
    let total = entries.len();
    let mut report = BatchFixReport::default();

    for (i, (path, record)) in entries.into_iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            tracing::info!(bank, processed = i, total, "Batch fix cancelled");
            break;
        }
        if let Some(progress) = progress_fn {
            progress(i, total, &record.title);
        }
        report.scanned += 1;

        if !has_issues(&record.test_cases) {
            continue;
        }
        report.with_issues += 1;

        match fixer.fix(&record) {
            Ok(updated) if updated != record => match store.overwrite(&path, &updated) {
                Ok(()) => report.fixed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = %path.display(), error = %e, "Failed to overwrite fixed record");
                }
            },
            Ok(_) => report.failed += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(title = %record.title, error = %e, "Test case fix failed");
            }
        }
    }

    tracing::info!(
        bank,
        scanned = report.scanned,
        fixed = report.fixed,
        failed = report.failed,
        "Batch fix finished"
    );
    Ok(report)
}
