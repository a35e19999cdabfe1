//! Error types for mapcache operations

use thiserror::Error;
use uuid::Uuid;

/// Session lifecycle and ownership errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session {session_id} is closed")]
    SessionClosed { session_id: Uuid },

    #[error("Concurrent use of session {session_id} detected")]
    ConcurrentSessionUse { session_id: Uuid },
}

/// Errors raised by the query-execution collaborator.
///
/// These are carried to the caller verbatim; the cache never retries or
/// masks them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Statement {statement} failed: {reason}")]
    ExecutionFailed { statement: String, reason: String },

    #[error("Unknown statement: {statement}")]
    UnknownStatement { statement: String },

    #[error("Missing parameter {parameter} for {statement}")]
    MissingParameter { statement: String, parameter: String },

    #[error("Constraint violation in {statement}: {reason}")]
    ConstraintViolation { statement: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read configuration from {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Namespace {namespace} references unknown cache namespace {target}")]
    DanglingCacheRef { namespace: String, target: String },

    #[error("Cache reference cycle through namespace {namespace}")]
    CyclicCacheRef { namespace: String },

    #[error("Statement {statement} is not mapped in namespace {namespace}")]
    UnknownStatement { namespace: String, statement: String },
}

/// Master error type for all mapcache errors.
#[derive(Debug, Clone, Error)]
pub enum MapCacheError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] ExecutorError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Result mapping failed for {statement}: {reason}")]
    Mapping { statement: String, reason: String },
}

impl MapCacheError {
    /// True when the operation was attempted on a closed session.
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::Session(SessionError::SessionClosed { .. }))
    }

    /// True when reentrant or parallel use of one session was detected.
    pub fn is_concurrent_use(&self) -> bool {
        matches!(self, Self::Session(SessionError::ConcurrentSessionUse { .. }))
    }

    /// True when the error came from the query-execution collaborator.
    pub fn is_collaborator_error(&self) -> bool {
        matches!(self, Self::Collaborator(_))
    }
}

/// Result type alias for mapcache operations.
pub type MapCacheResult<T> = Result<T, MapCacheError>;

// =============================================================================
// TESTS
// =============================================================================
