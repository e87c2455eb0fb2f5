//! ExecReport — the single message a worker sends when its process exits.
//!
//! One report per dispatched worker, consumed exactly once by `finish()`.
//! Double consumption is a caller bug, not handled defensively.

/// Exit summary of one external process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExecReport {
    /// Exit code. 0 means success.
    pub exit_code: i32,
}

impl ExecReport {
    pub fn new(exit_code: i32) -> Self {
        Self { exit_code }
    }

    /// True if the process succeeded (exit code 0).
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }
}
