//! Locally stored entities.
//!
//! These are owned by the local store. Receivers read and mutate them only
//! through the store traits in [`crate::store`].

use msgsync_protocol::{
    Access, AccessRole, ClientId, ClientInfo, ConversationId, ConversationSnapshot,
    ConversationType, Member, MemberRole, MutedStatus, Protocol, ProtocolInfo, ReceiptMode,
    TeamId, TeamSnapshot, UserId, UserProfile,
};
use serde::{Deserialize, Serialize};

/// Local state of an MLS group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupState {
    /// This device must join via external commit.
    PendingJoin,
    /// This device waits for a welcome.
    PendingWelcome,
    /// Group is usable.
    Established,
    /// Local epoch diverged from the backend; a rejoin is needed.
    OutOfSync,
}

/// Protocol state of a stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolState {
    /// Pairwise sessions.
    Proteus,
    /// MLS group.
    Mls {
        /// MLS group id.
        group_id: String,
        /// Current epoch.
        epoch: u64,
        /// Local group state.
        group_state: GroupState,
    },
    /// Proteus and MLS side by side.
    Mixed {
        /// MLS group id.
        group_id: String,
        /// Current epoch.
        epoch: u64,
        /// Local group state.
        group_state: GroupState,
    },
}

impl ProtocolState {
    /// Builds the local state from backend information.
    ///
    /// A group the device already established keeps that state when the
    /// group id is unchanged.
    #[must_use]
    pub fn from_info(info: &ProtocolInfo, previous: Option<&ProtocolState>) -> Self {
        let known_state = |group: &str| match previous {
            Some(ProtocolState::Mls {
                group_id,
                group_state,
                ..
            })
            | Some(ProtocolState::Mixed {
                group_id,
                group_state,
                ..
            }) if group_id == group => *group_state,
            _ => GroupState::PendingJoin,
        };
        match info {
            ProtocolInfo::Proteus => ProtocolState::Proteus,
            ProtocolInfo::Mls { group_id, epoch } => ProtocolState::Mls {
                group_id: group_id.clone(),
                epoch: *epoch,
                group_state: known_state(group_id),
            },
            ProtocolInfo::Mixed { group_id, epoch } => ProtocolState::Mixed {
                group_id: group_id.clone(),
                epoch: *epoch,
                group_state: known_state(group_id),
            },
        }
    }

    /// Returns the protocol name.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolState::Proteus => Protocol::Proteus,
            ProtocolState::Mls { .. } => Protocol::Mls,
            ProtocolState::Mixed { .. } => Protocol::Mixed,
        }
    }

    /// Returns the MLS group id, if any.
    #[must_use]
    pub fn group_id(&self) -> Option<&str> {
        match self {
            ProtocolState::Proteus => None,
            ProtocolState::Mls { group_id, .. } | ProtocolState::Mixed { group_id, .. } => {
                Some(group_id.as_str())
            }
        }
    }

    /// Returns the MLS epoch, if any.
    #[must_use]
    pub fn epoch(&self) -> Option<u64> {
        match self {
            ProtocolState::Proteus => None,
            ProtocolState::Mls { epoch, .. } | ProtocolState::Mixed { epoch, .. } => Some(*epoch),
        }
    }

    /// Returns the MLS group state, if any.
    #[must_use]
    pub fn group_state(&self) -> Option<GroupState> {
        match self {
            ProtocolState::Proteus => None,
            ProtocolState::Mls { group_state, .. } | ProtocolState::Mixed { group_state, .. } => {
                Some(*group_state)
            }
        }
    }

    /// Sets the epoch and group state. No-op for Proteus.
    pub fn set_group(&mut self, new_epoch: u64, new_state: GroupState) {
        if let ProtocolState::Mls {
            epoch, group_state, ..
        }
        | ProtocolState::Mixed {
            epoch, group_state, ..
        } = self
        {
            *epoch = new_epoch;
            *group_state = new_state;
        }
    }

    /// Sets the group state only. No-op for Proteus.
    pub fn set_group_state(&mut self, new_state: GroupState) {
        if let ProtocolState::Mls { group_state, .. } | ProtocolState::Mixed { group_state, .. } =
            self
        {
            *group_state = new_state;
        }
    }
}

/// Verification status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// All devices verified.
    Verified,
    /// Verification was lost.
    Degraded,
    /// Never verified.
    #[default]
    NotVerified,
}

/// A stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id.
    pub id: ConversationId,
    /// Display name.
    pub name: Option<String>,
    /// Conversation kind.
    pub conversation_type: ConversationType,
    /// Protocol state.
    pub protocol: ProtocolState,
    /// Members, self included.
    pub members: Vec<Member>,
    /// Verification status.
    pub verification: VerificationStatus,
    /// Access modes.
    pub access: Vec<Access>,
    /// Access roles.
    pub access_roles: Vec<AccessRole>,
    /// Read receipts.
    pub receipt_mode: ReceiptMode,
    /// Self-deleting message timer.
    pub message_timer_ms: Option<u64>,
    /// Self user's notification level.
    pub muted: MutedStatus,
    /// Archived by the self user.
    pub archived: bool,
    /// True while a guest link exists.
    pub has_guest_link: bool,
    /// Owning team.
    pub team: Option<TeamId>,
    /// Creator.
    pub creator: Option<UserId>,
}

impl Conversation {
    /// Creates an empty Proteus conversation of the given type.
    pub fn new(id: ConversationId, conversation_type: ConversationType) -> Self {
        Self {
            id,
            name: None,
            conversation_type,
            protocol: ProtocolState::Proteus,
            members: Vec::new(),
            verification: VerificationStatus::default(),
            access: Vec::new(),
            access_roles: Vec::new(),
            receipt_mode: ReceiptMode::default(),
            message_timer_ms: None,
            muted: MutedStatus::default(),
            archived: false,
            has_guest_link: false,
            team: None,
            creator: None,
        }
    }

    /// Builds a stored conversation from a backend snapshot, keeping local-only
    /// fields from `previous`.
    #[must_use]
    pub fn from_snapshot(snapshot: &ConversationSnapshot, previous: Option<&Conversation>) -> Self {
        Self {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            conversation_type: snapshot.conversation_type,
            protocol: ProtocolState::from_info(
                &snapshot.protocol,
                previous.map(|conversation| &conversation.protocol),
            ),
            members: snapshot.members.clone(),
            verification: previous.map(|c| c.verification).unwrap_or_default(),
            access: snapshot.access.clone(),
            access_roles: snapshot.access_roles.clone(),
            receipt_mode: snapshot.receipt_mode,
            message_timer_ms: snapshot.message_timer_ms,
            muted: previous.map(|c| c.muted).unwrap_or_default(),
            archived: previous.is_some_and(|c| c.archived),
            has_guest_link: previous.is_some_and(|c| c.has_guest_link),
            team: snapshot.team.clone(),
            creator: snapshot.creator.clone(),
        }
    }

    /// Sets the members.
    #[must_use]
    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = members;
        self
    }

    /// Sets the protocol state.
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolState) -> Self {
        self.protocol = protocol;
        self
    }

    /// Returns true if `user` is a member.
    #[must_use]
    pub fn has_member(&self, user: &UserId) -> bool {
        self.members.iter().any(|member| &member.id == user)
    }

    /// Returns the role of `user`, if a member.
    #[must_use]
    pub fn role_of(&self, user: &UserId) -> Option<MemberRole> {
        self.members
            .iter()
            .find(|member| &member.id == user)
            .map(|member| member.role)
    }

    /// Returns true for group conversations.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.conversation_type == ConversationType::Group
    }
}

/// Legal hold status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LegalHoldStatus {
    /// Not under legal hold.
    #[default]
    Disabled,
    /// A legal hold device was requested.
    Pending,
    /// Under legal hold.
    Enabled,
}

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Handle.
    pub handle: Option<String>,
    /// Team membership.
    pub team: Option<TeamId>,
    /// Team permission bits.
    pub team_permissions: Option<u64>,
    /// True if the account was deleted.
    pub deleted: bool,
    /// True once federation with the user's backend stopped.
    pub defederated: bool,
    /// Legal hold status.
    pub legal_hold: LegalHoldStatus,
}

impl User {
    /// Creates a user with only a name.
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            handle: None,
            team: None,
            team_permissions: None,
            deleted: false,
            defederated: false,
            legal_hold: LegalHoldStatus::default(),
        }
    }

    /// Builds a stored user from a backend profile, keeping local-only flags.
    #[must_use]
    pub fn from_profile(profile: &UserProfile, previous: Option<&User>) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            handle: profile.handle.clone(),
            team: profile.team.clone(),
            team_permissions: previous.and_then(|user| user.team_permissions),
            deleted: profile.deleted,
            defederated: previous.is_some_and(|user| user.defederated),
            legal_hold: previous.map(|user| user.legal_hold).unwrap_or_default(),
        }
    }
}

/// A device of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client id.
    pub id: ClientId,
    /// Owner.
    pub user: UserId,
    /// Device class.
    pub device_type: Option<String>,
    /// Label.
    pub label: Option<String>,
}

impl Client {
    /// Builds a client record for `user`.
    #[must_use]
    pub fn from_info(user: UserId, info: &ClientInfo) -> Self {
        Self {
            id: info.id.clone(),
            user,
            device_type: info.device_type.clone(),
            label: info.label.clone(),
        }
    }
}

/// A stored team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team id.
    pub id: TeamId,
    /// Name.
    pub name: String,
    /// Icon asset id.
    pub icon: String,
}

impl From<&TeamSnapshot> for Team {
    fn from(snapshot: &TeamSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            icon: snapshot.icon.clone(),
        }
    }
}

/// Why federation with some members stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FederationStopReason {
    /// The self backend stopped federating with this domain.
    DomainRemoved(String),
    /// These two backends stopped federating with each other.
    ConnectionRemoved(Vec<String>),
}

/// Content of a locally generated system message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemContent {
    /// Conversation was created.
    ConversationCreated,
    /// Members were added.
    MemberJoined {
        /// Added members.
        members: Vec<UserId>,
    },
    /// Members left or were removed.
    MemberLeft {
        /// Removed members.
        members: Vec<UserId>,
    },
    /// Conversation renamed.
    ConversationRenamed {
        /// New name.
        name: String,
    },
    /// Read receipts toggled.
    ReceiptModeChanged {
        /// New state.
        enabled: bool,
    },
    /// Self-deleting timer changed.
    MessageTimerChanged {
        /// New timer.
        timer_ms: Option<u64>,
    },
    /// Protocol changed.
    ProtocolChanged {
        /// New protocol.
        protocol: Protocol,
    },
    /// Federation stopped; `removed` lists members dropped from the conversation.
    FederationStopped {
        /// Why.
        reason: FederationStopReason,
        /// Removed members; empty for 1:1 conversations.
        removed: Vec<UserId>,
    },
    /// Notifications were lost; earlier history may be incomplete.
    HistoryLost,
    /// A team member left the team.
    TeamMemberRemoved {
        /// Removed member.
        member: UserId,
    },
}

/// Content of a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    /// Decrypted text.
    Text(String),
    /// A message that could not be decrypted.
    FailedDecryption {
        /// Sending device, when known.
        sender_client: Option<ClientId>,
        /// Failure branch.
        reason: String,
    },
    /// Local system message.
    System(SystemContent),
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id; unique per conversation.
    pub id: String,
    /// Conversation.
    pub conversation: ConversationId,
    /// Sender.
    pub sender: UserId,
    /// RFC 3339 timestamp.
    pub date: String,
    /// Content.
    pub content: MessageContent,
}

impl Message {
    /// Creates a system message.
    pub fn system(
        id: impl Into<String>,
        conversation: ConversationId,
        sender: UserId,
        date: impl Into<String>,
        content: SystemContent,
    ) -> Self {
        Self {
            id: id.into(),
            conversation,
            sender,
            date: date.into(),
            content: MessageContent::System(content),
        }
    }

    /// Returns the system content, if this is a system message.
    #[must_use]
    pub fn system_content(&self) -> Option<&SystemContent> {
        match &self.content {
            MessageContent::System(content) => Some(content),
            _ => None,
        }
    }
}

/// Team and account feature settings relevant to this client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserConfig {
    /// File sharing allowed.
    pub file_sharing_enabled: bool,
    /// MLS allowed.
    pub mls_enabled: bool,
    /// Default protocol for new conversations.
    pub default_protocol: Option<Protocol>,
    /// Protocols the team supports.
    pub supported_protocols: Vec<Protocol>,
    /// Classified domains; `None` when the feature is off.
    pub classified_domains: Option<Vec<String>>,
    /// Conference calling allowed.
    pub conference_calling_enabled: bool,
    /// Guest links allowed.
    pub guest_links_enabled: bool,
    /// Enforced self-deleting timeout in seconds, if enforced.
    pub enforced_self_deleting_secs: Option<u64>,
    /// Self-deleting messages allowed.
    pub self_deleting_enabled: bool,
    /// E2EI settings.
    pub e2ei: Option<E2eiSettings>,
    /// Read receipts sent by this account.
    pub read_receipts_enabled: bool,
    /// Typing indicator shown by this account.
    pub typing_indicator_enabled: bool,
}

/// End-to-end identity settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eiSettings {
    /// E2EI required.
    pub enabled: bool,
    /// Enrollment grace period.
    pub verification_expiration_secs: u64,
    /// ACME discovery endpoint.
    pub discovery_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mls(group: &str, epoch: u64) -> ProtocolInfo {
        ProtocolInfo::Mls {
            group_id: group.into(),
            epoch,
        }
    }

    #[test]
    fn established_group_survives_snapshot() {
        let previous = ProtocolState::Mls {
            group_id: "g1".into(),
            epoch: 3,
            group_state: GroupState::Established,
        };
        let next = ProtocolState::from_info(&mls("g1", 5), Some(&previous));
        assert_eq!(next.group_state(), Some(GroupState::Established));
        assert_eq!(next.epoch(), Some(5));

        let other_group = ProtocolState::from_info(&mls("g2", 0), Some(&previous));
        assert_eq!(other_group.group_state(), Some(GroupState::PendingJoin));
    }

    #[test]
    fn set_group_is_noop_for_proteus() {
        let mut state = ProtocolState::Proteus;
        state.set_group(4, GroupState::OutOfSync);
        assert_eq!(state, ProtocolState::Proteus);
    }

    #[test]
    fn member_lookup() {
        let alice = UserId::new("alice", "wire.com");
        let conversation = Conversation::new(
            ConversationId::new("c", "wire.com"),
            ConversationType::Group,
        )
        .with_members(vec![Member::new(alice.clone(), MemberRole::Admin)]);
        assert!(conversation.has_member(&alice));
        assert_eq!(conversation.role_of(&alice), Some(MemberRole::Admin));
        assert!(conversation.is_group());
    }
}
