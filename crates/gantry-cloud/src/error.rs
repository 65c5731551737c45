//! Provisioning engine error types

use crate::ledger::ExecutionState;
use gantry_core::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// Provisioning engine errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Dependency cycle detected among: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("Resource '{id}' depends on undeclared resource '{dependency}'")]
    UnknownDependency { id: String, dependency: String },

    #[error("Duplicate resource id: {0}")]
    DuplicateId(String),

    #[error("No client registered for resource kind: {0}")]
    ClientNotRegistered(ResourceKind),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Permanent error: {0}")]
    Permanent(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Resource '{id}' not ready after {timeout:?}: {diagnostic}")]
    ReadinessTimeout {
        id: String,
        timeout: Duration,
        diagnostic: String,
    },

    #[error("Resource '{id}' failed readiness: {reason}")]
    ReadinessFailed { id: String, reason: String },

    #[error("Resource '{id}' cannot start: dependency '{dependency}' is {state}")]
    DependencyNotReady {
        id: String,
        dependency: String,
        state: String,
    },

    #[error("Invalid state transition for '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ExecutionState,
        to: ExecutionState,
    },

    #[error("Ledger record not found: {0}")]
    RecordNotFound(String),

    #[error("Ledger is corrupted ({location}): {message}")]
    LedgerCorruption { location: String, message: String },

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::Transient(_))
    }

    /// Errors that stop the whole run rather than a single entry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CloudError::CycleDetected(_)
                | CloudError::UnknownDependency { .. }
                | CloudError::DuplicateId(_)
                | CloudError::InvalidTransition { .. }
                | CloudError::RecordNotFound(_)
                | CloudError::LedgerCorruption { .. }
                | CloudError::LockError(_)
                | CloudError::TaskFailed(_)
                | CloudError::Io(_)
                | CloudError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
