//! Event processing logger.
//!
//! Every receiver reports the outcome of each event through an
//! [`EventLogger`] it was given at construction. Records carry the account,
//! the obfuscated event id, the event kind and an outcome of `success`,
//! `failure` or `skipped`.

use msgsync_core::{CoreFailure, CoreResult};
use msgsync_protocol::{Event, UserId};

/// Structured logger for event outcomes of one account.
#[derive(Debug, Clone)]
pub struct EventLogger {
    account: String,
}

impl EventLogger {
    /// Creates a logger for `account`.
    pub fn new(account: &UserId) -> Self {
        Self {
            account: account.obfuscated(),
        }
    }

    /// Returns the obfuscated account this logger reports for.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Logs a successfully handled event.
    pub fn success(&self, event: &Event, info: &str) {
        tracing::info!(
            account = %self.account,
            event_id = %event.id.obfuscated(),
            kind = event.kind(),
            outcome = "success",
            info,
            "event processed"
        );
    }

    /// Logs an event whose handling failed.
    pub fn failure(&self, event: &Event, failure: &CoreFailure, info: &str) {
        tracing::error!(
            account = %self.account,
            event_id = %event.id.obfuscated(),
            kind = event.kind(),
            outcome = "failure",
            branch = failure.branch(),
            error = %failure,
            info,
            "event processing failed"
        );
    }

    /// Logs an event that was rejected without being applied.
    pub fn rejected(&self, event: &Event, reason: &str) {
        tracing::error!(
            account = %self.account,
            event_id = %event.id.obfuscated(),
            kind = event.kind(),
            outcome = "failure",
            reason,
            "event rejected"
        );
    }

    /// Logs an event that needed no work.
    pub fn skipped(&self, event: &Event, reason: &str) {
        tracing::warn!(
            account = %self.account,
            event_id = %event.id.obfuscated(),
            kind = event.kind(),
            outcome = "skipped",
            reason,
            "event skipped"
        );
    }

    /// Logs one branch of a multi-step repair. `result` carries how many
    /// items the branch changed.
    pub fn branch(&self, event: &Event, step: &str, result: &CoreResult<usize>) {
        match result {
            Ok(changed) => tracing::info!(
                account = %self.account,
                event_id = %event.id.obfuscated(),
                kind = event.kind(),
                step,
                outcome = "success",
                changed,
                "repair step finished"
            ),
            Err(failure) => tracing::error!(
                account = %self.account,
                event_id = %event.id.obfuscated(),
                kind = event.kind(),
                step,
                outcome = "failure",
                branch = failure.branch(),
                error = %failure,
                "repair step failed"
            ),
        }
    }
}
