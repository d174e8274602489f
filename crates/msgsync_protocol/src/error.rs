//! Protocol error types.

use thiserror::Error;

/// Errors raised while reading event envelopes.
///
/// Payload problems never surface here; they decode to
/// [`crate::DomainEvent::Unknown`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The envelope is not valid JSON or lacks its id.
    #[error("invalid event envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),

    /// The envelope carries an empty id.
    #[error("event envelope has an empty id")]
    EmptyId,
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
