//! GCP client error types

use gantry_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("{tool} not found. Please install: {hint}")]
    ToolNotFound {
        tool: &'static str,
        hint: &'static str,
    },

    #[error("{tool} authentication failed: {message}")]
    AuthenticationFailed { tool: &'static str, message: String },

    #[error("{tool} command failed: {stderr}")]
    CommandFailed { tool: &'static str, stderr: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GcpError>;

/// How a failed command should be handled by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Permanent,
    NotFound,
    AlreadyExists,
}

const ALREADY_EXISTS: &[&str] = &["already_exists", "already exists", "alreadyexists"];

const NOT_FOUND: &[&str] = &[
    "not_found",
    "not found",
    "notfound",
    "nosuchhostedzone",
    "does not exist",
];

const RATE_LIMITED: &[&str] = &[
    "rate limit",
    "ratelimitexceeded",
    "throttling",
    "too many requests",
    "429",
];

const PERMANENT: &[&str] = &[
    "quota",
    "permission",
    "forbidden",
    "invalid",
    "unauthorized",
    "failed_precondition",
];

const TRANSIENT: &[&str] = &[
    "resource_exhausted",
    "503",
    "502",
    "500 internal",
    "unavailable",
    "deadline",
    "timeout",
    "timed out",
    "connection reset",
    "try again",
    "priorrequestnotcomplete",
];

/// Classify a command failure from its stderr
pub fn classify(stderr: &str) -> FailureClass {
    let lower = stderr.to_lowercase();
    let matches = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if matches(ALREADY_EXISTS) {
        FailureClass::AlreadyExists
    } else if matches(NOT_FOUND) {
        FailureClass::NotFound
    } else if matches(RATE_LIMITED) {
        FailureClass::Transient
    } else if matches(PERMANENT) {
        FailureClass::Permanent
    } else if matches(TRANSIENT) {
        FailureClass::Transient
    } else {
        FailureClass::Permanent
    }
}

impl GcpError {
    pub fn class(&self) -> FailureClass {
        match self {
            GcpError::CommandFailed { stderr, .. } => classify(stderr),
            GcpError::IoError(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                FailureClass::Transient
            }
            _ => FailureClass::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == FailureClass::NotFound
    }
}

impl From<GcpError> for CloudError {
    fn from(e: GcpError) -> Self {
        let message = e.to_string();
        match e.class() {
            FailureClass::Transient => CloudError::Transient(message),
            FailureClass::Permanent => CloudError::Permanent(message),
            FailureClass::NotFound => CloudError::ResourceNotFound(message),
            FailureClass::AlreadyExists => CloudError::ResourceAlreadyExists(message),
        }
    }
}
