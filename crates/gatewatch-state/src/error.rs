//! Error types for the health snapshot.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for snapshot operations.
pub type StateResult<T> = Result<T, StateError>;

/// Snapshot I/O errors. None of them is fatal to the daemon.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(String),
}
