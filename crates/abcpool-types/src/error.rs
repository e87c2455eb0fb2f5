//! The abcpool error taxonomy.
//!
//! Every failure propagates synchronously to the orchestrating caller;
//! nothing here is downgraded to a warning.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// All the ways a run can fail.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid schema name, rule set, or caller misuse. Raised before any
    /// process starts and never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The external process exited non-zero. Fatal for that worker; carries
    /// the tail of its error stream. Retry policy, if any, belongs to the
    /// caller.
    #[error("{name} (pid {pid:?}) failed with exit code {exit_code}; stderr tail:\n{stderr_tail}")]
    Execution {
        name: String,
        pid: Option<u32>,
        exit_code: i32,
        stderr_tail: String,
    },

    /// Header classification or column projection failed after the process
    /// itself succeeded. Subprocess success is necessary but not sufficient.
    #[error("post-processing failed for {name}: {source}")]
    PostProcessing {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// A worker task panicked inside the pool.
    #[error("worker task panicked: {0}")]
    Panicked(String),

    /// Merged row total disagrees with the expected replicate count.
    #[error("{}: merged {actual} data rows, expected {expected}", .path.display())]
    CountMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// An input to a merge carries a different header than the first input.
    #[error("{}: header does not match the first merge input", .path.display())]
    HeaderMismatch { path: PathBuf },

    /// A requested column index exceeds a row's width (malformed or
    /// truncated row).
    #[error("{}: column index {index} out of range on data row {row} ({width} columns)", .path.display())]
    ColumnOutOfRange {
        path: PathBuf,
        row: u64,
        index: usize,
        width: usize,
    },

    /// A table is structurally unusable (empty file, missing header line,
    /// unparseable value).
    #[error("{}: malformed table: {reason}", .path.display())]
    MalformedTable { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a failure from an acceptance hook, keeping the worker name for
    /// diagnostics.
    pub fn post_processing(name: impl Into<String>, source: Error) -> Self {
        Error::PostProcessing {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_mentions_name_and_code() {
        let err = Error::Execution {
            name: "simulation-1".into(),
            pid: Some(4242),
            exit_code: 1,
            stderr_tail: "boom".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("simulation-1"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn post_processing_wraps_source() {
        let inner = Error::MalformedTable {
            path: PathBuf::from("/tmp/raw.txt"),
            reason: "empty file".into(),
        };
        let err = Error::post_processing("simulation-2", inner);
        assert!(err.to_string().contains("simulation-2"));
        assert!(err.to_string().contains("empty file"));
    }
}
