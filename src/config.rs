use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "PracticeBank";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "practice_bank=info"
}

/// Get the application data directory
/// ~/PracticeBank/ on all platforms; falls back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default root under which every named bank lives.
pub fn default_bank_root() -> PathBuf {
    app_data_dir().join("bank")
}

/// How chunks are turned into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Local pattern-based parsing, no external calls.
    Heuristic,
    /// External text-generation service with JSON repair.
    Service,
}

/// Tunables for one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub bank_root: PathBuf,
    pub mode: ExtractionMode,
    /// Upper bound on chunk length (characters).
    pub max_chunk_size: usize,
    /// A boundary line only splits once the buffer is longer than this.
    pub min_chunk_size: usize,
    /// Records with fewer cases are topped up when a service is available.
    pub min_test_cases: usize,
    /// Cases requested per exercise in the extraction instruction.
    pub requested_test_cases: usize,
    /// Extra attempts for a chunk after a connection-level service failure.
    pub chunk_retries: u32,
    pub repair_timeout_secs: u64,
    /// Bound on one supplement or fix request.
    pub fix_timeout_secs: u64,
    /// Advisory notice threshold while awaiting an extraction response.
    pub long_running_notice_secs: u64,
    pub ollama_url: String,
    pub model_name: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bank_root: default_bank_root(),
            mode: ExtractionMode::Heuristic,
            max_chunk_size: 8_000,
            min_chunk_size: 1_000,
            min_test_cases: 3,
            requested_test_cases: 5,
            chunk_retries: 1,
            repair_timeout_secs: 10,
            fix_timeout_secs: 120,
            long_running_notice_secs: 30,
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "qwen2.5-coder:7b".to_string(),
        }
    }
}

impl IngestConfig {
    /// Defaults overridden by `PRACTICE_BANK_*` environment variables.
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("PRACTICE_BANK_ROOT") {
            if !root.trim().is_empty() {
                config.bank_root = PathBuf::from(root);
            }
        }
        if let Ok(url) = std::env::var("PRACTICE_BANK_OLLAMA_URL") {
            if !url.trim().is_empty() {
                config.ollama_url = url.trim().to_string();
                config.mode = ExtractionMode::Service;
            }
        }
        if let Ok(model) = std::env::var("PRACTICE_BANK_MODEL") {
            if !model.trim().is_empty() {
                config.model_name = model.trim().to_string();
            }
        }
        if let Some(max) = env_usize("PRACTICE_BANK_MAX_CHUNK") {
            config.max_chunk_size = max;
        }
        if let Some(min) = env_usize("PRACTICE_BANK_MIN_CHUNK") {
            config.min_chunk_size = min;
        }
        config
    }

    pub fn repair_timeout(&self) -> Duration {
        Duration::from_secs(self.repair_timeout_secs)
    }

    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_timeout_secs)
    }

    pub fn long_running_notice(&self) -> Duration {
        Duration::from_secs(self.long_running_notice_secs)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid numeric setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("PracticeBank"));
    }

    #[test]
    fn bank_root_under_app_data() {
        let root = default_bank_root();
        assert!(root.starts_with(app_data_dir()));
        assert!(root.ends_with("bank"));
    }

    #[test]
    fn defaults_match_pipeline_contract() {
        let config = IngestConfig::default();
        assert_eq!(config.max_chunk_size, 8_000);
        assert_eq!(config.min_chunk_size, 1_000);
        assert_eq!(config.min_test_cases, 3);
        assert_eq!(config.repair_timeout(), Duration::from_secs(10));
        assert_eq!(config.long_running_notice(), Duration::from_secs(30));
        assert_eq!(config.mode, ExtractionMode::Heuristic);
    }

    #[test]
    fn mode_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ExtractionMode::Service).unwrap(), "\"service\"");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
