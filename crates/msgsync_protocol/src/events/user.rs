//! User and connection events.

use crate::model::{ClientInfo, Connection};
use crate::types::{ClientId, UserId};
use serde::{Deserialize, Serialize};

/// Events about users, their devices and their connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserEvent {
    /// A connection was created or changed state.
    #[serde(rename = "user.connection")]
    NewConnection {
        /// The connection record.
        connection: Connection,
    },
    /// A device of the self user was removed.
    #[serde(rename = "user.client-remove")]
    ClientRemove {
        /// Removed client.
        client: ClientId,
    },
    /// A user account was deleted.
    #[serde(rename = "user.delete")]
    UserDelete {
        /// Deleted user.
        user: UserId,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// A user's profile changed.
    #[serde(rename = "user.update")]
    Update {
        /// Updated user.
        user: UserId,
        /// New name.
        #[serde(default)]
        name: Option<String>,
        /// New handle.
        #[serde(default)]
        handle: Option<String>,
    },
    /// A device was registered for the self user.
    #[serde(rename = "user.client-add")]
    NewClient {
        /// Registered client.
        client: ClientInfo,
    },
    /// A legal hold device was requested for the self user.
    #[serde(rename = "user.legalhold-request")]
    LegalHoldRequest {
        /// Subject user.
        user: UserId,
        /// Legal hold client.
        client: ClientId,
    },
    /// Legal hold was enabled for a user.
    #[serde(rename = "user.legalhold-enable")]
    LegalHoldEnabled {
        /// Subject user.
        user: UserId,
    },
    /// Legal hold was disabled for a user.
    #[serde(rename = "user.legalhold-disable")]
    LegalHoldDisabled {
        /// Subject user.
        user: UserId,
    },
}

impl UserEvent {
    /// Returns a stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            UserEvent::NewConnection { .. } => "User.NewConnection",
            UserEvent::ClientRemove { .. } => "User.ClientRemove",
            UserEvent::UserDelete { .. } => "User.UserDelete",
            UserEvent::Update { .. } => "User.Update",
            UserEvent::NewClient { .. } => "User.NewClient",
            UserEvent::LegalHoldRequest { .. } => "User.LegalHoldRequest",
            UserEvent::LegalHoldEnabled { .. } => "User.LegalHoldEnabled",
            UserEvent::LegalHoldDisabled { .. } => "User.LegalHoldDisabled",
        }
    }
}
