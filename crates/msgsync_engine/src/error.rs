//! Error types for the sync engine.

use crate::session::LogoutReason;
use msgsync_core::CoreFailure;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that end a sync run.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// A step failed and the failure could not be retried away.
    #[error("sync failed: {0}")]
    Failed(#[from] CoreFailure),

    /// Sync was stopped.
    #[error("sync cancelled")]
    Cancelled,

    /// The account was logged out.
    #[error("account logged out: {0:?}")]
    LoggedOut(LogoutReason),

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The account already has a running coordinator.
    #[error("account {0} is already syncing")]
    AlreadyRunning(String),
}

impl SyncError {
    /// Returns true if the same step may succeed when retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Failed(failure) => failure.should_retry(),
            _ => false,
        }
    }

    /// Returns the underlying failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&CoreFailure> {
        match self {
            SyncError::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
