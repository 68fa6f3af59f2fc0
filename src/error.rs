use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors raised by data loading, scoring, graph completion and the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// I/O failure while reading data or configuration.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Malformed CSV input.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Configuration file could not be parsed.
    #[error("invalid config {path}: {message}")]
    Config {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// Caller supplied an argument the search cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A PDAG without any consistent DAG extension was passed to completion.
    #[error("pdag has no consistent extension: {0}")]
    NoConsistentExtension(String),
    /// A stage was cancelled while its workers were running.
    #[error("search interrupted during {0}")]
    Interrupted(&'static str),
    /// A worker thread panicked before producing its partial graph.
    #[error("{phase} worker {worker} panicked")]
    WorkerPanicked {
        /// Phase the worker belonged to.
        phase: &'static str,
        /// Partition index of the worker.
        worker: usize,
    },
    /// Tabular data violates the discrete dataset contract.
    #[error("data error: {0}")]
    Data(String),
}

impl SearchError {
    /// Returns true for conditions the convergence loop absorbs instead of failing.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SearchError::Interrupted(_))
    }
}
