//! Error types for the unit of work.

use thiserror::Error;
use uowkit_session::SessionError;

/// Result type for unit-of-work operations.
pub type UowResult<T> = Result<T, UowError>;

/// Errors that can occur in unit-of-work operations.
#[derive(Debug, Error)]
pub enum UowError {
    /// The session or transaction failed, including cancellation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The unit of work has been disposed.
    #[error("unit of work is disposed")]
    Disposed,

    /// Teardown completed but some steps failed.
    ///
    /// Only produced under [`crate::TeardownPolicy::Propagate`].
    #[error("teardown failed: {}", describe(.failures))]
    Teardown {
        /// Failures in teardown order.
        failures: Vec<SessionError>,
    },
}

impl UowError {
    /// Returns true if this error reports a fired cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UowError::Session(err) if err.is_cancelled())
    }

    /// Returns the underlying session error, if any.
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            UowError::Session(err) => Some(err),
            _ => None,
        }
    }
}

fn describe(failures: &[SessionError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
