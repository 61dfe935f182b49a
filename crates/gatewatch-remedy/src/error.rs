//! Errors from external commands and their output.

use thiserror::Error;

/// Result type alias for port operations.
pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command template {0:?} rendered to nothing")]
    Empty(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unexpected {what} output: {output:?}")]
    Unparseable { what: &'static str, output: String },

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}
