//! Value types carried by events and by full-state snapshots.

use crate::types::{ClientId, ConversationId, TeamId, UserId};
use serde::{Deserialize, Serialize};

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    /// Multi-party conversation.
    Group,
    /// Conversation between exactly two connected users.
    OneOnOne,
    /// The user's own conversation, used for cross-device state.
    #[serde(rename = "self")]
    SelfConversation,
    /// Placeholder for a connection request that was not accepted yet.
    ConnectionPending,
}

/// Security protocol of a conversation as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ProtocolInfo {
    /// Pairwise sessions.
    Proteus,
    /// MLS group.
    Mls {
        /// MLS group id.
        group_id: String,
        /// Current epoch.
        epoch: u64,
    },
    /// Proteus and MLS side by side during migration.
    Mixed {
        /// MLS group id.
        group_id: String,
        /// Current epoch.
        epoch: u64,
    },
}

impl ProtocolInfo {
    /// Returns the protocol name without group details.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolInfo::Proteus => Protocol::Proteus,
            ProtocolInfo::Mls { .. } => Protocol::Mls,
            ProtocolInfo::Mixed { .. } => Protocol::Mixed,
        }
    }

    /// Returns the MLS group id, if any.
    #[must_use]
    pub fn group_id(&self) -> Option<&str> {
        match self {
            ProtocolInfo::Proteus => None,
            ProtocolInfo::Mls { group_id, .. } | ProtocolInfo::Mixed { group_id, .. } => {
                Some(group_id.as_str())
            }
        }
    }
}

/// Protocol name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Pairwise sessions.
    Proteus,
    /// MLS group.
    Mls,
    /// Both.
    Mixed,
}

/// Role of a member inside a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRole {
    /// May change conversation settings and membership.
    #[serde(rename = "wire_admin")]
    Admin,
    /// Regular member.
    #[serde(rename = "wire_member")]
    Member,
}

/// A conversation member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The member's user id.
    pub id: UserId,
    /// The member's role.
    pub role: MemberRole,
}

impl Member {
    /// Creates a member with the given role.
    pub fn new(id: UserId, role: MemberRole) -> Self {
        Self { id, role }
    }
}

/// State of a connection between the self user and another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Self sent a request.
    Sent,
    /// Another user sent a request to self.
    Pending,
    /// Self ignored an incoming request.
    Ignored,
    /// Both sides are connected.
    Accepted,
    /// Self withdrew a sent request.
    Cancelled,
    /// Self blocked the other user.
    Blocked,
}

impl ConnectionState {
    /// Returns true while the connection is still a request.
    #[must_use]
    pub fn is_request(self) -> bool {
        matches!(self, ConnectionState::Sent | ConnectionState::Pending)
    }
}

/// A connection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Requesting side (normally self).
    pub from: UserId,
    /// The other party.
    pub to: UserId,
    /// The 1:1 conversation backing this connection.
    pub conversation: ConversationId,
    /// Current state.
    pub status: ConnectionState,
    /// Backend timestamp of the last change.
    #[serde(default)]
    pub last_update: String,
}

/// Conversation access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Nobody can join.
    Private,
    /// Members can invite.
    Invite,
    /// Joinable by link.
    Link,
    /// Joinable by code.
    Code,
    /// Users can add themselves.
    SelfInvite,
}

/// Category of user allowed in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    /// Members of the owning team.
    TeamMember,
    /// Users outside the owning team.
    NonTeamMember,
    /// Guest accounts.
    Guest,
    /// Bots and integrations.
    Service,
}

/// Whether read receipts are enabled for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptMode {
    /// Receipts are sent.
    Enabled,
    /// Receipts are not sent.
    #[default]
    Disabled,
}

/// Notification level chosen by the self user for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutedStatus {
    /// Every message notifies.
    #[default]
    AllAllowed,
    /// Only mentions and replies notify.
    OnlyMentionsAndRepliesAllowed,
    /// Nothing notifies.
    AllMuted,
}

/// Full description of a conversation as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Conversation id.
    pub id: ConversationId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Conversation kind.
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    /// Protocol information.
    #[serde(flatten)]
    pub protocol: ProtocolInfo,
    /// Creator of the conversation.
    #[serde(default)]
    pub creator: Option<UserId>,
    /// Every member including self.
    #[serde(default)]
    pub members: Vec<Member>,
    /// Access modes.
    #[serde(default)]
    pub access: Vec<Access>,
    /// Access roles.
    #[serde(default)]
    pub access_roles: Vec<AccessRole>,
    /// Read receipt mode.
    #[serde(default)]
    pub receipt_mode: ReceiptMode,
    /// Self-deleting message timer in milliseconds.
    #[serde(default)]
    pub message_timer_ms: Option<u64>,
    /// Owning team.
    #[serde(default)]
    pub team: Option<TeamId>,
}

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Unique handle.
    #[serde(default)]
    pub handle: Option<String>,
    /// Team membership.
    #[serde(default)]
    pub team: Option<TeamId>,
    /// True if the account was deleted.
    #[serde(default)]
    pub deleted: bool,
}

/// A device registered by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client id.
    pub id: ClientId,
    /// Device class, e.g. `phone` or `desktop`.
    #[serde(default)]
    pub device_type: Option<String>,
    /// User-chosen label.
    #[serde(default)]
    pub label: Option<String>,
}

/// Team description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    /// Team id.
    pub id: TeamId,
    /// Display name.
    pub name: String,
    /// Icon asset id.
    #[serde(default)]
    pub icon: String,
}

/// Binary on/off state of a backend feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStatus {
    /// Feature is on.
    Enabled,
    /// Feature is off.
    #[default]
    Disabled,
}

impl FeatureStatus {
    /// Returns true for [`FeatureStatus::Enabled`].
    #[must_use]
    pub fn is_enabled(self) -> bool {
        matches!(self, FeatureStatus::Enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_reads_flattened_protocol() {
        let raw = json!({
            "id": { "id": "conv", "domain": "wire.com" },
            "type": "group",
            "protocol": "mls",
            "group_id": "g1",
            "epoch": 4,
            "members": [
                { "id": { "id": "alice", "domain": "wire.com" }, "role": "wire_admin" }
            ]
        });
        let snapshot: ConversationSnapshot = serde_json::from_value(raw).unwrap();
        assert_eq!(snapshot.protocol.protocol(), Protocol::Mls);
        assert_eq!(snapshot.protocol.group_id(), Some("g1"));
        assert_eq!(snapshot.members[0].role, MemberRole::Admin);
        assert_eq!(snapshot.receipt_mode, ReceiptMode::Disabled);
    }

    #[test]
    fn request_states() {
        assert!(ConnectionState::Sent.is_request());
        assert!(ConnectionState::Pending.is_request());
        assert!(!ConnectionState::Accepted.is_request());
        assert!(!ConnectionState::Ignored.is_request());
    }
}
