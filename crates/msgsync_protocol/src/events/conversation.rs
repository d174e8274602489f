//! Conversation events.

use crate::model::{
    Access, AccessRole, ConversationSnapshot, Member, MemberRole, MutedStatus, Protocol,
    ReceiptMode,
};
use crate::types::{ClientId, ConversationId, UserId};
use serde::{Deserialize, Serialize};

/// Why members left a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberLeaveReason {
    /// The members left on their own.
    #[default]
    Left,
    /// An admin removed them.
    Removed,
    /// Their accounts were deleted.
    UserDeleted,
}

/// A change to one member's settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberChange {
    /// A member's role changed.
    Role {
        /// Affected member.
        member: UserId,
        /// New role.
        role: MemberRole,
    },
    /// Self changed the notification level.
    MutedStatus {
        /// New level.
        status: MutedStatus,
        /// Backend timestamp of the change.
        #[serde(default)]
        changed_at: String,
    },
    /// Self archived or unarchived the conversation.
    Archived {
        /// Archived flag.
        archived: bool,
    },
    /// A member update this client does not track.
    Ignored,
}

/// Events about conversations, their members and their messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationEvent {
    /// A conversation was created or self was added to one.
    #[serde(rename = "conversation.create")]
    NewConversation {
        /// Full conversation description.
        conversation: ConversationSnapshot,
        /// Creator.
        #[serde(default)]
        from: Option<UserId>,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// A conversation was deleted.
    #[serde(rename = "conversation.delete")]
    DeletedConversation {
        /// Conversation id.
        conversation: ConversationId,
        /// Who deleted it.
        from: UserId,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// A conversation was renamed.
    #[serde(rename = "conversation.rename")]
    Renamed {
        /// Conversation id.
        conversation: ConversationId,
        /// Who renamed it.
        from: UserId,
        /// New name.
        name: String,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// Members were added.
    #[serde(rename = "conversation.member-join")]
    MemberJoin {
        /// Conversation id.
        conversation: ConversationId,
        /// Who added them.
        from: UserId,
        /// Added members.
        members: Vec<Member>,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// Members left or were removed.
    #[serde(rename = "conversation.member-leave")]
    MemberLeave {
        /// Conversation id.
        conversation: ConversationId,
        /// Who removed them.
        from: UserId,
        /// Removed members.
        removed: Vec<UserId>,
        /// Why they left.
        #[serde(default)]
        reason: MemberLeaveReason,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// A member's settings changed.
    #[serde(rename = "conversation.member-update")]
    MemberChanged {
        /// Conversation id.
        conversation: ConversationId,
        /// The change.
        change: MemberChange,
    },
    /// A Proteus-encrypted message.
    #[serde(rename = "conversation.otr-message-add")]
    NewMessage {
        /// Conversation id.
        conversation: ConversationId,
        /// Sender.
        from: UserId,
        /// Sending device.
        sender_client: ClientId,
        /// Base64 ciphertext.
        content: String,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// An MLS application or handshake message.
    #[serde(rename = "conversation.mls-message-add")]
    NewMlsMessage {
        /// Conversation id.
        conversation: ConversationId,
        /// Sender.
        from: UserId,
        /// Subconversation, when the message targets one.
        #[serde(default)]
        sub_conversation: Option<String>,
        /// Base64 MLS message.
        content: String,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// An MLS welcome adding this device to a group.
    #[serde(rename = "conversation.mls-welcome")]
    MlsWelcome {
        /// Conversation id.
        conversation: ConversationId,
        /// Sender.
        from: UserId,
        /// Base64 welcome message.
        welcome: String,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// Access modes or roles changed.
    #[serde(rename = "conversation.access-update")]
    AccessUpdate {
        /// Conversation id.
        conversation: ConversationId,
        /// Who changed them.
        from: UserId,
        /// New access modes.
        access: Vec<Access>,
        /// New access roles.
        #[serde(default)]
        access_roles: Vec<AccessRole>,
    },
    /// Read receipt mode changed.
    #[serde(rename = "conversation.receipt-mode-update")]
    ReceiptModeUpdate {
        /// Conversation id.
        conversation: ConversationId,
        /// Who changed it.
        from: UserId,
        /// New mode.
        receipt_mode: ReceiptMode,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// Self-deleting message timer changed.
    #[serde(rename = "conversation.message-timer-update")]
    MessageTimerUpdate {
        /// Conversation id.
        conversation: ConversationId,
        /// Who changed it.
        from: UserId,
        /// New timer; `None` disables it.
        #[serde(default)]
        message_timer_ms: Option<u64>,
        /// Backend timestamp.
        #[serde(default)]
        timestamp: String,
    },
    /// A guest link was created or replaced.
    #[serde(rename = "conversation.code-update")]
    CodeUpdated {
        /// Conversation id.
        conversation: ConversationId,
        /// Link key.
        key: String,
        /// Link code.
        code: String,
        /// True if the link is password protected.
        #[serde(default)]
        has_password: bool,
    },
    /// The guest link was revoked.
    #[serde(rename = "conversation.code-delete")]
    CodeDeleted {
        /// Conversation id.
        conversation: ConversationId,
    },
    /// A member started or stopped typing.
    #[serde(rename = "conversation.typing")]
    Typing {
        /// Conversation id.
        conversation: ConversationId,
        /// Typing user.
        from: UserId,
        /// True when typing started.
        started: bool,
    },
    /// The conversation moved to another protocol.
    #[serde(rename = "conversation.protocol-update")]
    ProtocolChanged {
        /// Conversation id.
        conversation: ConversationId,
        /// Who changed it.
        from: UserId,
        /// New protocol.
        protocol: Protocol,
    },
}

impl ConversationEvent {
    /// Returns the id of the conversation this event targets.
    #[must_use]
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            ConversationEvent::NewConversation { conversation, .. } => &conversation.id,
            ConversationEvent::DeletedConversation { conversation, .. }
            | ConversationEvent::Renamed { conversation, .. }
            | ConversationEvent::MemberJoin { conversation, .. }
            | ConversationEvent::MemberLeave { conversation, .. }
            | ConversationEvent::MemberChanged { conversation, .. }
            | ConversationEvent::NewMessage { conversation, .. }
            | ConversationEvent::NewMlsMessage { conversation, .. }
            | ConversationEvent::MlsWelcome { conversation, .. }
            | ConversationEvent::AccessUpdate { conversation, .. }
            | ConversationEvent::ReceiptModeUpdate { conversation, .. }
            | ConversationEvent::MessageTimerUpdate { conversation, .. }
            | ConversationEvent::CodeUpdated { conversation, .. }
            | ConversationEvent::CodeDeleted { conversation }
            | ConversationEvent::Typing { conversation, .. }
            | ConversationEvent::ProtocolChanged { conversation, .. } => conversation,
        }
    }

    /// Returns a stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ConversationEvent::NewConversation { .. } => "Conversation.NewConversation",
            ConversationEvent::DeletedConversation { .. } => "Conversation.DeletedConversation",
            ConversationEvent::Renamed { .. } => "Conversation.Renamed",
            ConversationEvent::MemberJoin { .. } => "Conversation.MemberJoin",
            ConversationEvent::MemberLeave { .. } => "Conversation.MemberLeave",
            ConversationEvent::MemberChanged { .. } => "Conversation.MemberChanged",
            ConversationEvent::NewMessage { .. } => "Conversation.NewMessage",
            ConversationEvent::NewMlsMessage { .. } => "Conversation.NewMLSMessage",
            ConversationEvent::MlsWelcome { .. } => "Conversation.MLSWelcome",
            ConversationEvent::AccessUpdate { .. } => "Conversation.AccessUpdate",
            ConversationEvent::ReceiptModeUpdate { .. } => "Conversation.ReceiptModeUpdate",
            ConversationEvent::MessageTimerUpdate { .. } => "Conversation.MessageTimerUpdate",
            ConversationEvent::CodeUpdated { .. } => "Conversation.CodeUpdated",
            ConversationEvent::CodeDeleted { .. } => "Conversation.CodeDeleted",
            ConversationEvent::Typing { .. } => "Conversation.Typing",
            ConversationEvent::ProtocolChanged { .. } => "Conversation.ProtocolChanged",
        }
    }
}
