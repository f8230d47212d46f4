pub mod analysis;
pub mod rules;
pub mod store;

pub use analysis::*;
pub use rules::*;
pub use store::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Atomic write to {path} failed: {reason}")]
    AtomicWrite { path: PathBuf, reason: String },

    #[error("Invalid bank name: {0:?}")]
    InvalidBankName(String),

    #[error("Bank not found: {0}")]
    BankNotFound(PathBuf),
}
