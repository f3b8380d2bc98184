//! Error types for Tapdeck
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using TapdeckError
pub type Result<T> = std::result::Result<T, TapdeckError>;

/// Unified error type for Tapdeck operations
#[derive(Debug, Error)]
pub enum TapdeckError {
    // Binding validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // Registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // Action execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    // Hardware read errors
    #[error("Read error: {0}")]
    Read(#[from] ReadError),
}

/// Rejected binding input: bad uid, unknown kind or a parameter that
/// violates the action's contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Tag UID must not be empty")]
    EmptyUid,

    #[error("Tag UID \"{0}\" is not a hexadecimal identifier")]
    MalformedUid(String),

    #[error("Unknown action kind \"{0}\"")]
    UnknownActionKind(String),

    #[error("Parameter required for action {kind}")]
    MissingParameter { kind: &'static str },

    #[error("No parameter allowed for action {kind}")]
    UnexpectedParameter { kind: &'static str },

    #[error("Invalid parameter for action {kind}: {reason}")]
    InvalidParameter { kind: &'static str, reason: String },
}

/// Registry lookup and persistence errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No binding registered for tag {0}")]
    NotFound(String),

    #[error("Failed to persist registry to {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("Registry snapshot {path} is unusable: {reason}")]
    FatalLoad { path: String, reason: String },
}

/// Failure of an action against the playback backend or the host system
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Playback backend request {method} failed: {reason}")]
    Backend { method: String, reason: String },

    #[error("Playback backend returned an unexpected response for {method}: {reason}")]
    UnexpectedResponse { method: String, reason: String },

    #[error("System command failed: {0}")]
    System(String),
}

/// Errors from a single hardware read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// A glitch during one read; the cycle is skipped
    #[error("Transient read failure: {0}")]
    Transient(String),

    /// The input source is gone and will not yield further events
    #[error("Input source disconnected: {0}")]
    Disconnected(String),
}

impl ReadError {
    /// Whether the worker should keep reading after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, ReadError::Transient(_))
    }
}

impl RegistryError {
    pub fn persistence(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        RegistryError::Persistence {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn fatal_load(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        RegistryError::FatalLoad {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
