//! Federation events.

use serde::{Deserialize, Serialize};

/// Events announcing that federation between backends stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FederationEvent {
    /// The self backend stopped federating with `domain`.
    #[serde(rename = "federation.delete")]
    Delete {
        /// Removed domain.
        domain: String,
    },
    /// Two backends stopped federating with each other.
    ///
    /// A well-formed payload carries exactly two domains.
    #[serde(rename = "federation.connectionRemoved")]
    ConnectionRemoved {
        /// Domains that no longer federate.
        domains: Vec<String>,
    },
}

impl FederationEvent {
    /// Returns a stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FederationEvent::Delete { .. } => "Federation.Delete",
            FederationEvent::ConnectionRemoved { .. } => "Federation.ConnectionRemoved",
        }
    }
}
