//! Run and teardown reports

use serde::{Deserialize, Serialize};

/// A failed entry with its error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFailure {
    pub id: String,
    pub error: String,
}

/// Result of an apply run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Reached Ready during this run
    pub ready: Vec<String>,

    /// Already Ready with an unchanged spec
    pub unchanged: Vec<String>,

    pub failed: Vec<EntryFailure>,

    /// Skipped because a dependency failed or was blocked
    pub blocked: Vec<String>,

    /// In flight or not yet started when the run was cancelled
    pub cancelled: Vec<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty() && self.cancelled.is_empty()
    }

    /// 0 on full convergence, 1 when the ledger holds resumable work
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn add_failure(&mut self, id: impl Into<String>, error: impl ToString) {
        self.failed.push(EntryFailure {
            id: id.into(),
            error: error.to_string(),
        });
    }

    pub(crate) fn sort(&mut self) {
        self.ready.sort();
        self.unchanged.sort();
        self.failed.sort_by(|a, b| a.id.cmp(&b.id));
        self.blocked.sort();
        self.cancelled.sort();
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ready, {} unchanged, {} failed, {} blocked, {} cancelled ({} ms)",
            self.ready.len(),
            self.unchanged.len(),
            self.failed.len(),
            self.blocked.len(),
            self.cancelled.len(),
            self.duration_ms
        )
    }
}

/// Result of a teardown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    pub destroyed: Vec<String>,

    pub failed: Vec<EntryFailure>,

    /// Still in the ledger because something depending on them failed
    pub remaining: Vec<String>,

    pub cancelled: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl TeardownReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.remaining.is_empty() && !self.cancelled
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn add_failure(&mut self, id: impl Into<String>, error: impl ToString) {
        self.failed.push(EntryFailure {
            id: id.into(),
            error: error.to_string(),
        });
    }
}

impl std::fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} destroyed, {} failed, {} remaining ({} ms)",
            self.destroyed.len(),
            self.failed.len(),
            self.remaining.len(),
            self.duration_ms
        )
    }
}
