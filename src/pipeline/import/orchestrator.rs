//! Import run: scan → chunk → extract → repair → fix → validate → persist → analyze.
//!
//! One chunk is in flight at a time. Per-chunk and per-record failures are
//! logged and collected; only an empty input aborts the run.

use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::progress::{ImportEvent, ImportOutcome, ImportPhase, ImportProgress};
use super::scan::{collect_input_files, source_name, source_stem};
use crate::bank::{analysis, sanitize_file_name, BankStore, ParseRuleSummary, StemAllocator};
use crate::config::{ExtractionMode, IngestConfig};
use crate::models::{question_id, ExerciseRecord};
use crate::pipeline::heuristic::{analyze_format, parse_content};
use crate::pipeline::service::{
    records_from_payload, AdapterEvent, ExtractionAdapter, LlmClient, LlmError, ResponseRepairer,
};
use crate::pipeline::testcases::{validate, TestCaseFixer};
use crate::pipeline::{CancelFlag, Chunk, Chunker, IngestError};

/// Poll interval while waiting on the adapter channel.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One debug line per this many streamed fragments.
const PARTIAL_LOG_EVERY: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub path: PathBuf,
    pub bank_name: String,
}

struct FilePlan {
    source: String,
    stem: String,
    chunks: Vec<Chunk>,
    front_matter: bool,
}

/// Per-source sequence number and the file stems already written this run.
#[derive(Default)]
struct SourceCursor {
    position: usize,
    stems: StemAllocator,
}

/// Mutable state of a single run.
struct RunState<'a> {
    progress: ImportProgress,
    errors: Vec<String>,
    warnings: usize,
    partial_events: u64,
    on_event: Option<&'a dyn Fn(&ImportEvent)>,
}

impl<'a> RunState<'a> {
    fn emit(&self, event: ImportEvent) {
        if let Some(callback) = self.on_event {
            callback(&event);
        }
    }

    fn publish(&mut self, phase: ImportPhase, status: impl Into<String>) {
        self.progress.set_phase(phase, status);
        self.emit(ImportEvent::Progress(self.progress.clone()));
    }

    fn record_error(&mut self, context: &str, error: &dyn std::fmt::Display) {
        self.errors.push(format!("{context}: {error}"));
    }

    fn report_warnings(&mut self, record: &ExerciseRecord) {
        let warnings = validate(record);
        if warnings.is_empty() {
            return;
        }
        for w in &warnings {
            tracing::warn!(title = %record.title, case = w.index, reason = ?w.reason, "Test case needs attention");
        }
        self.warnings += warnings.len();
        self.emit(ImportEvent::ValidationWarnings {
            title: record.title.clone(),
            warnings,
        });
    }
}

pub struct ImportPipeline {
    config: IngestConfig,
    store: BankStore,
    client: Option<Arc<dyn LlmClient>>,
}

impl ImportPipeline {
    /// `client` is required for service extraction and for inline test-case
    /// improvement. Without it every chunk takes the local path.
    pub fn new(config: IngestConfig, client: Option<Arc<dyn LlmClient>>) -> Self {
        let store = BankStore::new(&config.bank_root);
        Self { config, store, client }
    }

    pub fn store(&self) -> &BankStore {
        &self.store
    }

    fn service_client(&self) -> Option<&Arc<dyn LlmClient>> {
        match self.config.mode {
            ExtractionMode::Service => self.client.as_ref(),
            ExtractionMode::Heuristic => None,
        }
    }

    /// Run one import. Never panics on bad input; every outcome, including
    /// cancellation, is reported through the returned `ImportOutcome`.
    pub fn run(
        &self,
        request: &ImportRequest,
        cancel: &CancelFlag,
        on_event: Option<&dyn Fn(&ImportEvent)>,
    ) -> ImportOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("import", run_id = %run_id, bank = %request.bank_name);
        let _guard = span.enter();

        let mut run = RunState {
            progress: ImportProgress::new(run_id),
            errors: Vec::new(),
            warnings: 0,
            partial_events: 0,
            on_event,
        };

        if let Err(e) = self.store.checked_bank_dir(&request.bank_name) {
            tracing::warn!(error = %e, "Import rejected");
            let outcome = ImportOutcome {
                message: e.to_string(),
                errors: vec![e.to_string()],
                ..ImportOutcome::no_input()
            };
            run.emit(ImportEvent::Finished(outcome.clone()));
            return outcome;
        }

        // Scanning
        run.publish(ImportPhase::Scanning, format!("Scanning {}", request.path.display()));
        let mut rules = ParseRuleSummary::default();
        let plans = self.scan(&request.path, &mut rules, &mut run);

        let total_chunks: usize = plans.iter().map(|p| p.chunks.len()).sum();
        if total_chunks == 0 {
            tracing::warn!(path = %request.path.display(), error = %IngestError::NoInput, "Nothing to import");
            let outcome = ImportOutcome {
                errors: run.errors,
                ..ImportOutcome::no_input()
            };
            if let Some(callback) = on_event {
                callback(&ImportEvent::Finished(outcome.clone()));
            }
            return outcome;
        }

        run.progress.total_files = plans.len();
        run.progress.total_chunks = total_chunks;
        run.emit(ImportEvent::Started {
            run_id,
            total_files: plans.len(),
            total_chunks,
        });
        tracing::info!(files = plans.len(), chunks = total_chunks, mode = ?self.config.mode, "Import started");

        let fixer = self.service_client().map(|client| {
            TestCaseFixer::new(
                Arc::clone(client),
                &self.config.model_name,
                self.config.fix_timeout(),
                self.config.min_test_cases,
            )
        });

        let mut cancelled = false;

        'files: for plan in &plans {
            run.progress.current_file = Some(plan.source.clone());
            let mut cursor = SourceCursor::default();

            for chunk in &plan.chunks {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'files;
                }

                run.publish(ImportPhase::Dispatching, chunk.label());
                let result = self.extract_chunk(chunk, plan.front_matter, cancel, &mut run);

                if cancel.is_cancelled() {
                    // A response that raced the cancellation is discarded.
                    cancelled = true;
                    break 'files;
                }

                match result {
                    Ok(records) => {
                        run.publish(ImportPhase::Applying, format!("{}: {} exercises", chunk.label(), records.len()));
                        let saved = self.apply_records(
                            records,
                            chunk,
                            plan,
                            &request.bank_name,
                            &mut cursor,
                            fixer.as_ref(),
                            &mut run,
                        );
                        run.progress.extracted += saved;
                    }
                    Err(IngestError::Cancelled) => {
                        cancelled = true;
                        break 'files;
                    }
                    Err(e) => {
                        tracing::warn!(source = %chunk.source_name, chunk = chunk.index, error = %e, "Chunk skipped");
                        run.progress.failed_chunks += 1;
                        run.record_error(&chunk.label(), &e);
                    }
                }

                run.progress.processed_chunks += 1;
                run.emit(ImportEvent::Progress(run.progress.clone()));
            }

            run.progress.processed_files += 1;
        }

        self.finalize(&request.bank_name, &rules, &mut run);

        let outcome = self.outcome(cancelled, &run);
        let final_phase = if cancelled { ImportPhase::Cancelled } else { ImportPhase::Completed };
        run.publish(final_phase, outcome.message.clone());
        tracing::info!(
            extracted = outcome.extracted,
            failed_chunks = outcome.failed_chunks,
            cancelled,
            "Import finished"
        );
        run.emit(ImportEvent::Finished(outcome.clone()));
        outcome
    }

    fn scan(&self, path: &Path, rules: &mut ParseRuleSummary, run: &mut RunState<'_>) -> Vec<FilePlan> {
        let chunker = Chunker::new(self.config.max_chunk_size, self.config.min_chunk_size);
        let mut plans = Vec::new();

        for file in collect_input_files(path) {
            let source = source_name(&file);
            let content = match std::fs::read_to_string(&file) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "Unreadable input file skipped");
                    run.record_error(&source, &e);
                    continue;
                }
            };

            let profile = analyze_format(&content);
            rules.add(&source, &profile);

            let chunks = if profile.is_front_matter {
                vec![Chunk::whole(&source, &content)]
            } else {
                chunker.split(&source, &content)
            };
            tracing::debug!(source = %source, chunks = chunks.len(), front_matter = profile.is_front_matter, "File planned");

            if chunks.is_empty() {
                continue;
            }
            plans.push(FilePlan {
                stem: source_stem(&file),
                source,
                chunks,
                front_matter: profile.is_front_matter,
            });
        }

        plans
    }

    fn extract_chunk(
        &self,
        chunk: &Chunk,
        front_matter: bool,
        cancel: &CancelFlag,
        run: &mut RunState<'_>,
    ) -> Result<Vec<ExerciseRecord>, IngestError> {
        let client = match self.service_client() {
            Some(client) if !front_matter => client,
            _ => return Ok(parse_content(&chunk.content, &analyze_format(&chunk.content))),
        };

        let adapter = ExtractionAdapter::new(
            Arc::clone(client),
            &self.config.model_name,
            self.config.requested_test_cases,
        );

        let mut attempt = 0u32;
        let raw = loop {
            match self.await_response(&adapter, chunk, cancel, run) {
                Ok(text) => break text,
                Err(e) if e.is_retryable() && attempt < self.config.chunk_retries => {
                    attempt += 1;
                    tracing::warn!(chunk = %chunk.label(), attempt, error = %e, "Retrying chunk");
                }
                Err(e) => return Err(e),
            }
        };

        run.publish(ImportPhase::Applying, format!("Parsing {}", chunk.label()));
        let repairer = ResponseRepairer::new(Arc::clone(client), &self.config.model_name, self.config.repair_timeout());
        let value = repairer.parse_or_repair(&raw)?;
        Ok(records_from_payload(&value, &chunk.source_name, chunk.index))
    }

    fn await_response(
        &self,
        adapter: &ExtractionAdapter,
        chunk: &Chunk,
        cancel: &CancelFlag,
        run: &mut RunState<'_>,
    ) -> Result<String, IngestError> {
        tracing::debug!(chunk = %chunk.label(), chars = chunk.char_len(), "Dispatching chunk");
        let call = adapter.dispatch(chunk);
        run.publish(ImportPhase::AwaitingResponse, call.label().to_string());

        let started = Instant::now();
        let notice_after = self.config.long_running_notice();
        let mut notified = false;

        loop {
            if cancel.is_cancelled() {
                call.abort();
                return Err(IngestError::Cancelled);
            }

            match call.recv_timeout(POLL_INTERVAL) {
                Ok(AdapterEvent::Partial(text)) => {
                    run.partial_events += 1;
                    if run.partial_events % PARTIAL_LOG_EVERY == 0 {
                        tracing::debug!(
                            chunk = %call.label(),
                            fragments = run.partial_events,
                            last_len = text.len(),
                            "Receiving extraction output"
                        );
                    }
                }
                Ok(AdapterEvent::Finished(text)) => return Ok(text),
                Ok(AdapterEvent::Failed(e)) => return Err(e.into()),
                Err(RecvTimeoutError::Timeout) => {
                    let elapsed = started.elapsed();
                    if !notified && elapsed >= notice_after {
                        notified = true;
                        tracing::info!(chunk = %call.label(), elapsed_secs = elapsed.as_secs(), "Extraction still running");
                        run.emit(ImportEvent::LongRunning {
                            chunk: call.label().to_string(),
                            elapsed_secs: elapsed.as_secs(),
                        });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(IngestError::ChunkExtraction(LlmError::HttpClient(
                        "Extraction worker stopped without a result".into(),
                    )));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_records(
        &self,
        records: Vec<ExerciseRecord>,
        chunk: &Chunk,
        plan: &FilePlan,
        bank: &str,
        cursor: &mut SourceCursor,
        fixer: Option<&TestCaseFixer>,
        run: &mut RunState<'_>,
    ) -> usize {
        let mut saved = 0;

        for (sequence, mut record) in records.into_iter().enumerate() {
            if !record.has_title() {
                tracing::debug!(chunk = %chunk.label(), "Untitled exercise dropped");
                continue;
            }
            if record.id.trim().is_empty() {
                record.id = question_id(&chunk.source_name, chunk.index, sequence, &record.title);
            }
            if let Some(fixer) = fixer {
                let (improved, report) = fixer.improve(record);
                if report.supplemented + report.fixed > 0 {
                    tracing::debug!(
                        title = %improved.title,
                        supplemented = report.supplemented,
                        fixed = report.fixed,
                        "Test cases improved"
                    );
                }
                record = improved;
            }
            run.report_warnings(&record);

            let stem = cursor.stems.allocate(&record.title, cursor.position);
            if stem != sanitize_file_name(&record.title, cursor.position) {
                tracing::debug!(title = %record.title, file = %stem, "Repeated title stored under a suffixed name");
            }
            match self.store.persist(&record, bank, &plan.stem, &stem) {
                Ok(_) => saved += 1,
                Err(e) => {
                    let e = IngestError::from(e);
                    tracing::warn!(title = %record.title, error = %e, "Record dropped");
                    run.record_error(&record.title, &e);
                }
            }
            cursor.position += 1;
        }

        saved
    }

    fn finalize(&self, bank: &str, rules: &ParseRuleSummary, run: &mut RunState<'_>) {
        run.publish(ImportPhase::Finalizing, "Analyzing bank");

        match analysis::refresh(&self.store, bank) {
            Ok(summary) => tracing::info!(total = summary.total_questions, "Bank analysis updated"),
            Err(e) => {
                tracing::warn!(error = %e, "Bank analysis failed");
                run.record_error("analysis", &e);
            }
        }

        let bank_dir = self.store.bank_dir(bank);
        let mut merged = ParseRuleSummary::load(&bank_dir).unwrap_or_default();
        merged.merge(rules);
        if let Err(e) = merged.save(&bank_dir) {
            tracing::warn!(error = %e, "Parse rules not saved");
            run.record_error("parse rules", &e);
        }
    }

    fn outcome(&self, cancelled: bool, run: &RunState<'_>) -> ImportOutcome {
        let p = &run.progress;
        let message = if cancelled {
            format!("Import cancelled after {} of {} chunks ({} exercises saved)", p.processed_chunks, p.total_chunks, p.extracted)
        } else if p.extracted == 0 {
            format!("No exercises extracted from {} chunks", p.total_chunks)
        } else if p.failed_chunks > 0 {
            format!(
                "Imported {} exercises from {} files ({} chunks failed)",
                p.extracted, p.total_files, p.failed_chunks
            )
        } else {
            format!("Imported {} exercises from {} files", p.extracted, p.total_files)
        };

        ImportOutcome {
            success: !cancelled && p.extracted > 0,
            message,
            extracted: p.extracted,
            cancelled,
            failed_chunks: p.failed_chunks,
            warnings: run.warnings,
            errors: run.errors.clone(),
        }
    }
}
