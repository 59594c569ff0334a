//! Common error types for pairpick

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for pairpick operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the annotation service
///
/// An empty choice from a worker is not represented here: it is a no-op,
/// not a failure.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Corpus violates a load-time precondition (e.g. fewer than 2 outputs)
    #[error("Corpus configuration error: {0}")]
    Corpus(String),

    /// Appending judgments to the persistent log failed
    #[error("Failed to persist judgments to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Client-held session state is malformed or in the wrong phase
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Remote sync step failed (logged by the sync daemon, never fatal)
    #[error("Sync error: {0}")]
    Sync(String),
}
