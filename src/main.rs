//! `practice-bank` - import exercise documents into a question bank, repair
//! thin or elided test cases, and summarize a bank.
//!
//! ```bash
//! practice-bank import ./notes --bank algo
//! practice-bank import week1.md --bank algo --mode service
//! practice-bank fix --bank algo
//! practice-bank analyze --bank algo --refresh
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use practice_bank::bank::{analysis, render_markdown, BankStore, StorageError};
use practice_bank::config::{ExtractionMode, IngestConfig, APP_NAME, APP_VERSION};
use practice_bank::pipeline::import::{ImportEvent, ImportPhase, ImportPipeline, ImportRequest};
use practice_bank::pipeline::service::{LlmClient, OllamaClient};
use practice_bank::pipeline::testcases::{fix_bank, TestCaseFixer};
use practice_bank::pipeline::CancelFlag;

/// Connection setup bound. Extraction streams have no total deadline since
/// local models may take many minutes on one chunk.
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Parser)]
#[command(name = "practice-bank", version, about = "Build coding-practice question banks from exercise documents")]
struct Cli {
    /// Directory holding all banks. Defaults to PRACTICE_BANK_ROOT or
    /// ~/PracticeBank/bank.
    #[arg(long, global = true)]
    bank_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a document, or every .md/.markdown/.txt file under a directory.
    Import {
        path: PathBuf,

        #[arg(long)]
        bank: String,

        /// Extraction path. Service mode falls back to heuristic when the
        /// service is unreachable.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Regenerate defective test cases in a persisted bank.
    Fix {
        #[arg(long)]
        bank: String,
    },

    /// Print the bank analysis report.
    Analyze {
        #[arg(long)]
        bank: String,

        /// Recompute even when the saved analysis is current.
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Heuristic,
    Service,
}

impl From<ModeArg> for ExtractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Heuristic => ExtractionMode::Heuristic,
            ModeArg::Service => ExtractionMode::Service,
        }
    }
}

/// A client for the configured service, or `None` when it cannot serve the
/// configured model.
fn connect(config: &IngestConfig) -> Option<Arc<dyn LlmClient>> {
    let client = match OllamaClient::new(&config.ollama_url, CONNECT_TIMEOUT_SECS) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "Service client could not be built");
            return None;
        }
    };
    match client.is_model_available(&config.model_name) {
        Ok(true) => Some(Arc::new(client)),
        Ok(false) => {
            tracing::warn!(model = %config.model_name, url = %client.base_url(), "Model not installed");
            None
        }
        Err(e) => {
            tracing::warn!(url = %client.base_url(), error = %e, "Service unreachable");
            None
        }
    }
}

/// First Ctrl-C requests a cooperative stop through `cancel`; a second one
/// exits immediately.
fn install_interrupt_handler(cancel: CancelFlag) {
    let spawned = std::thread::Builder::new().name("interrupt".into()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!(error = %e, "Interrupt handler unavailable");
                return;
            }
        };
        runtime.block_on(async {
            let mut presses = 0u32;
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                presses += 1;
                if presses > 1 {
                    std::process::exit(130);
                }
                eprintln!("Stopping after the current step (Ctrl-C again to quit now)");
                cancel.cancel();
            }
        });
    });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Interrupt handler thread not started");
    }
}

fn print_event(event: &ImportEvent) {
    match event {
        ImportEvent::Started { total_files, total_chunks, .. } => {
            eprintln!("Importing {total_files} file(s), {total_chunks} chunk(s)");
        }
        ImportEvent::Progress(p) if p.phase == ImportPhase::Dispatching => {
            eprintln!("[{:>3}%] {}", p.percent(), p.status);
        }
        ImportEvent::LongRunning { chunk, elapsed_secs } => {
            eprintln!("       {chunk}: still waiting after {elapsed_secs}s");
        }
        ImportEvent::ValidationWarnings { title, warnings } => {
            eprintln!("       {title}: {} test case(s) need attention", warnings.len());
        }
        _ => {}
    }
}

fn run_import(
    mut config: IngestConfig,
    path: PathBuf,
    bank: String,
    mode: Option<ModeArg>,
    cancel: &CancelFlag,
) -> ExitCode {
    if let Some(mode) = mode {
        config.mode = mode.into();
    }

    let client = match config.mode {
        ExtractionMode::Service => {
            let client = connect(&config);
            if client.is_none() {
                eprintln!("Service unavailable, using heuristic extraction");
                config.mode = ExtractionMode::Heuristic;
            }
            client
        }
        ExtractionMode::Heuristic => None,
    };

    let pipeline = ImportPipeline::new(config, client);
    let request = ImportRequest { path, bank_name: bank };
    let outcome = pipeline.run(&request, cancel, Some(&print_event));

    println!("{}", outcome.message);
    for error in &outcome.errors {
        eprintln!("  {error}");
    }
    if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_fix(config: IngestConfig, bank: String, cancel: &CancelFlag) -> ExitCode {
    let Some(client) = connect(&config) else {
        eprintln!("Fixing test cases needs the text-generation service at {}", config.ollama_url);
        return ExitCode::FAILURE;
    };

    let store = BankStore::new(&config.bank_root);
    let fixer = TestCaseFixer::new(client, &config.model_name, config.fix_timeout(), config.min_test_cases);
    let progress = |done: usize, total: usize, title: &str| eprintln!("[{}/{}] {title}", done + 1, total);

    match fix_bank(&store, &bank, &fixer, cancel, Some(&progress)) {
        Ok(report) => {
            println!(
                "Scanned {} records: {} with issues, {} fixed, {} failed",
                report.scanned, report.with_issues, report.fixed, report.failed
            );
            if report.cancelled {
                println!("Fix cancelled");
            }
            if let Err(e) = analysis::refresh(&store, &bank) {
                tracing::warn!(error = %e, "Bank analysis not refreshed");
            }
            if report.failed == 0 && !report.cancelled {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Fix failed: {e}");
            if matches!(e, StorageError::BankNotFound(_)) {
                list_banks(&store);
            }
            ExitCode::FAILURE
        }
    }
}

fn list_banks(store: &BankStore) {
    match store.list_banks() {
        Ok(banks) if !banks.is_empty() => eprintln!("Banks under {}: {}", store.root().display(), banks.join(", ")),
        Ok(_) => eprintln!("No banks under {}", store.root().display()),
        Err(e) => tracing::debug!(error = %e, "Bank listing failed"),
    }
}

fn run_analyze(config: IngestConfig, bank: String, refresh: bool) -> ExitCode {
    let store = BankStore::new(&config.bank_root);
    if !store.bank_dir(&bank).is_dir() {
        eprintln!("Bank not found: {}", store.bank_dir(&bank).display());
        list_banks(&store);
        return ExitCode::FAILURE;
    }

    let result = if refresh {
        analysis::refresh(&store, &bank)
    } else {
        analysis::cached_analysis(&store, &bank)
    };
    match result {
        Ok(summary) => {
            print!("{}", render_markdown(&summary));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Analysis failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    practice_bank::init_tracing();
    let cli = Cli::parse();

    let mut config = IngestConfig::from_env();
    if let Some(root) = cli.bank_root {
        config.bank_root = root;
    }
    tracing::debug!(
        app = APP_NAME,
        version = APP_VERSION,
        bank_root = %config.bank_root.display(),
        mode = ?config.mode,
        "Configuration loaded"
    );

    let cancel = CancelFlag::new();
    match cli.command {
        Command::Import { path, bank, mode } => {
            install_interrupt_handler(cancel.clone());
            run_import(config, path, bank, mode, &cancel)
        }
        Command::Fix { bank } => {
            install_interrupt_handler(cancel.clone());
            run_fix(config, bank, &cancel)
        }
        Command::Analyze { bank, refresh } => run_analyze(config, bank, refresh),
    }
}
