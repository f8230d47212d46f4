use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::StorageError;
use crate::models::ExerciseRecord;

/// Longest file stem produced by `sanitize_file_name` (characters).
pub const MAX_FILE_STEM_CHARS: usize = 80;

/// Bank-level artifacts that live beside the per-source record directories.
pub const ANALYSIS_FILE: &str = "bank_analysis.json";
pub const REPORT_FILE: &str = "analysis_report.md";
pub const RULES_FILE: &str = "parse_rules.json";

/// Turn a record title into a portable file stem.
///
/// Reserved characters `<>:"/\|?*` and control characters become `_`,
/// whitespace runs collapse to one space, trailing dots and spaces are
/// trimmed and the result is capped. An empty result falls back to
/// `question_<position>`.
pub fn sanitize_file_name(title: &str, position: usize) -> String {
    let replaced: String = title
        .chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_FILE_STEM_CHARS).collect();
    let trimmed = capped.trim_end_matches(['.', ' ']).trim_start();

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        format!("question_{position}")
    } else {
        trimmed.to_string()
    }
}

/// Hands out distinct file stems for the records of one source within a run.
/// A repeated title gets a `_<position>` suffix, so two exercises sharing a
/// title both survive while a re-import still maps onto the same files.
#[derive(Debug, Default)]
pub struct StemAllocator {
    used: HashSet<String>,
}

impl StemAllocator {
    pub fn allocate(&mut self, title: &str, position: usize) -> String {
        let base = sanitize_file_name(title, position);
        let mut stem = base.clone();
        let mut suffix = position;
        while !self.used.insert(stem.clone()) {
            stem = format!("{base}_{suffix}");
            suffix += 1;
        }
        stem
    }
}

/// Serialize `value` to a temp file in the destination directory, then
/// rename it over `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &json)
}

pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = path.parent().ok_or_else(|| StorageError::AtomicWrite {
        path: path.to_path_buf(),
        reason: "no parent directory".into(),
    })?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::AtomicWrite {
        path: path.to_path_buf(),
        reason: e.error.to_string(),
    })?;
    Ok(())
}

/// File-system bank store rooted at `<bank_root>`.
#[derive(Debug, Clone)]
pub struct BankStore {
    root: PathBuf,
}

impl BankStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bank_dir(&self, bank: &str) -> PathBuf {
        self.root.join(bank)
    }

    /// Bank directory, rejecting names that are not valid file stems.
    pub fn checked_bank_dir(&self, bank: &str) -> Result<PathBuf, StorageError> {
        let name = bank.trim();
        if name.is_empty() || name != sanitize_file_name(name, 0) || name == "." || name == ".." {
            return Err(StorageError::InvalidBankName(bank.to_string()));
        }
        Ok(self.bank_dir(name))
    }

    /// Destination of a record: `<bank_root>/<bank>/<source_stem>/<file_stem>.json`.
    fn record_path(&self, bank: &str, source_stem: &str, file_stem: &str) -> Result<PathBuf, StorageError> {
        let dir = self.checked_bank_dir(bank)?.join(sanitize_file_name(source_stem, 0));
        Ok(dir.join(format!("{file_stem}.json")))
    }

    /// Write one record under `file_stem`, normally from `StemAllocator`.
    /// Re-persisting the same bank, source and stem replaces the earlier file.
    pub fn persist(
        &self,
        record: &ExerciseRecord,
        bank: &str,
        source_stem: &str,
        file_stem: &str,
    ) -> Result<PathBuf, StorageError> {
        let path = self.record_path(bank, source_stem, file_stem)?;
        write_json_atomic(&path, record)?;
        tracing::debug!(bank, path = %path.display(), "Record persisted");
        Ok(path)
    }

    pub fn overwrite(&self, path: &Path, record: &ExerciseRecord) -> Result<(), StorageError> {
        write_json_atomic(path, record)
    }

    pub fn read_record(&self, path: &Path) -> Result<ExerciseRecord, StorageError> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Paths of every record file in the bank, sorted.
    pub fn record_files(&self, bank: &str) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.checked_bank_dir(bank)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Load every readable record in the bank. Unreadable files are logged
    /// and skipped.
    pub fn load_records(&self, bank: &str) -> Result<Vec<(PathBuf, ExerciseRecord)>, StorageError> {
        let mut records = Vec::new();
        for path in self.record_files(bank)? {
            match self.read_record(&path) {
                Ok(record) => records.push((path, record)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }
        Ok(records)
    }

    pub fn list_banks(&self) -> Result<Vec<String>, StorageError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut banks: Vec<String> = std::fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        banks.sort();
        Ok(banks)
    }
}
