//! Local storage contracts.
//!
//! The on-device schema is owned by the embedding application. The engine
//! only talks to it through these traits, which return raw [`StoreError`]s;
//! callers convert them with [`crate::boundary::StoreResultExt::wrap_storage`].
//!
//! Every method is a single unit of work: implementations apply it
//! atomically under their own transaction discipline. Update methods report
//! [`StoreError::NotFound`] for absent rows; getters return `None`.
//!
//! [`StoreError`]: crate::boundary::StoreError
//! [`StoreError::NotFound`]: crate::boundary::StoreError::NotFound

mod memory;

pub use memory::{MemoryStore, StoreOp};

use crate::boundary::StoreResult;
use crate::model::{Client, Conversation, Message, Team, User, UserConfig};
use msgsync_protocol::{ClientId, Connection, ConversationId, Member, MemberRole, TeamId, UserId};
use std::sync::Arc;

/// Conversations and their members.
pub trait ConversationStore: Send + Sync {
    /// Inserts or replaces a conversation.
    fn upsert_conversation(&self, conversation: Conversation) -> StoreResult<()>;

    /// Returns a conversation.
    fn get_conversation(&self, id: &ConversationId) -> StoreResult<Option<Conversation>>;

    /// Applies `update` to a stored conversation.
    fn update_conversation(
        &self,
        id: &ConversationId,
        update: &mut dyn FnMut(&mut Conversation),
    ) -> StoreResult<()>;

    /// Deletes a conversation.
    fn delete_conversation(&self, id: &ConversationId) -> StoreResult<()>;

    /// Returns the ids of all stored conversations.
    fn conversation_ids(&self) -> StoreResult<Vec<ConversationId>>;

    /// Adds members that are not members yet. Returns how many were added.
    fn insert_members(&self, conversation: &ConversationId, members: &[Member])
        -> StoreResult<usize>;

    /// Removes the given users from a conversation. Returns how many were removed.
    fn delete_members_by_qualified_id(
        &self,
        users: &[UserId],
        conversation: &ConversationId,
    ) -> StoreResult<usize>;

    /// Changes a member's role.
    fn update_member_role(
        &self,
        conversation: &ConversationId,
        user: &UserId,
        role: MemberRole,
    ) -> StoreResult<()>;

    /// Removes `user` from every group conversation. Returns the affected conversations.
    fn delete_user_from_group_conversations(&self, user: &UserId)
        -> StoreResult<Vec<ConversationId>>;

    /// Returns group conversations with members on both `first` and `second`.
    fn group_conversations_with_members_from_domains(
        &self,
        first: &str,
        second: &str,
    ) -> StoreResult<Vec<Conversation>>;

    /// Returns 1:1 conversations with a member on `domain`.
    fn one_on_one_conversations_with_domain(&self, domain: &str) -> StoreResult<Vec<Conversation>>;
}

/// Users and their devices.
pub trait UserStore: Send + Sync {
    /// Inserts or replaces a user.
    fn upsert_user(&self, user: User) -> StoreResult<()>;

    /// Returns a user.
    fn get_user(&self, id: &UserId) -> StoreResult<Option<User>>;

    /// Applies `update` to a stored user.
    fn update_user(&self, id: &UserId, update: &mut dyn FnMut(&mut User)) -> StoreResult<()>;

    /// Inserts or replaces a client.
    fn upsert_client(&self, client: Client) -> StoreResult<()>;

    /// Removes a client.
    fn remove_client(&self, user: &UserId, client: &ClientId) -> StoreResult<()>;

    /// Returns the clients of a user.
    fn clients_of(&self, user: &UserId) -> StoreResult<Vec<Client>>;
}

/// Connections of the self user, keyed by the other party.
pub trait ConnectionStore: Send + Sync {
    /// Inserts or replaces a connection.
    fn upsert_connection(&self, connection: Connection) -> StoreResult<()>;

    /// Returns the connection with `other`.
    fn get_connection(&self, other: &UserId) -> StoreResult<Option<Connection>>;

    /// Returns every connection.
    fn connections(&self) -> StoreResult<Vec<Connection>>;

    /// Deletes the connection with `other`.
    fn delete_connection(&self, other: &UserId) -> StoreResult<()>;
}

/// Messages.
pub trait MessageStore: Send + Sync {
    /// Inserts a message. A message whose id already exists in the
    /// conversation is left untouched and `false` is returned.
    fn insert_message(&self, message: Message) -> StoreResult<bool>;

    /// Returns one message of a conversation.
    fn get_message(&self, conversation: &ConversationId, id: &str) -> StoreResult<Option<Message>>;

    /// Returns the messages of a conversation in insertion order.
    fn messages(&self, conversation: &ConversationId) -> StoreResult<Vec<Message>>;

    /// Deletes the messages of a conversation.
    fn delete_messages(&self, conversation: &ConversationId) -> StoreResult<()>;
}

/// Teams.
pub trait TeamStore: Send + Sync {
    /// Inserts or replaces a team.
    fn upsert_team(&self, team: Team) -> StoreResult<()>;

    /// Returns a team.
    fn get_team(&self, id: &TeamId) -> StoreResult<Option<Team>>;
}

/// Feature settings of the account.
pub trait UserConfigStore: Send + Sync {
    /// Returns the current settings.
    fn user_config(&self) -> StoreResult<UserConfig>;

    /// Applies `update` to the settings.
    fn update_user_config(&self, update: &mut dyn FnMut(&mut UserConfig)) -> StoreResult<()>;
}

/// Handles to every store an account uses.
#[derive(Clone)]
pub struct Storage {
    /// Conversations.
    pub conversations: Arc<dyn ConversationStore>,
    /// Users.
    pub users: Arc<dyn UserStore>,
    /// Connections.
    pub connections: Arc<dyn ConnectionStore>,
    /// Messages.
    pub messages: Arc<dyn MessageStore>,
    /// Teams.
    pub teams: Arc<dyn TeamStore>,
    /// Feature settings.
    pub config: Arc<dyn UserConfigStore>,
}

impl Storage {
    /// Builds a storage bundle backed entirely by `store`.
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            conversations: store.clone(),
            users: store.clone(),
            connections: store.clone(),
            messages: store.clone(),
            teams: store.clone(),
            config: store,
        }
    }

    /// Builds a fresh in-memory storage bundle.
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
