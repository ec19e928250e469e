//! Error types for session and transaction operations.

use std::time::Duration;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by a session or one of its transactions.
///
/// The unit of work never classifies these; it reacts to "any error" the
/// same way and hands the value back to its caller unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The cancellation signal fired before or during the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A row is locked by another session and the store does not wait.
    #[error("row {row} in table {table} is locked by another session")]
    Locked {
        /// Table holding the row.
        table: String,
        /// Row identifier.
        row: u64,
    },

    /// Waiting for a row lock exceeded the store's lock timeout.
    #[error("timed out after {timeout:?} waiting for lock on row {row} in table {table}")]
    LockTimeout {
        /// Table holding the row.
        table: String,
        /// Row identifier.
        row: u64,
        /// How long the session waited.
        timeout: Duration,
    },

    /// A mutation violated a store constraint.
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// The transaction was already committed, rolled back, or disposed.
    #[error("transaction already completed")]
    TransactionCompleted,

    /// The backend does not support the requested operation.
    #[error("not supported: {message}")]
    NotSupported {
        /// Description of the unsupported operation.
        message: String,
    },

    /// The session has been disposed.
    #[error("session is closed")]
    Closed,

    /// Any other backend failure.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl SessionError {
    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a not supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Creates a generic backend error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Returns true if this error reports a fired cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }

    /// Returns true if this error is a lost race for a row lock.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(
            self,
            SessionError::Locked { .. } | SessionError::LockTimeout { .. }
        )
    }
}
