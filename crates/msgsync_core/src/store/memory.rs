//! In-memory implementation of every store trait.

use super::{
    ConnectionStore, ConversationStore, MessageStore, TeamStore, UserConfigStore, UserStore,
};
use crate::boundary::{StoreError, StoreResult};
use crate::model::{Client, Conversation, Message, Team, User, UserConfig};
use msgsync_protocol::{
    ClientId, Connection, ConversationId, ConversationType, Member, MemberRole, TeamId, UserId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};

/// Store operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`ConversationStore::upsert_conversation`].
    UpsertConversation,
    /// [`ConversationStore::update_conversation`].
    UpdateConversation,
    /// [`ConversationStore::insert_members`].
    InsertMembers,
    /// [`ConversationStore::delete_members_by_qualified_id`].
    DeleteMembers,
    /// [`ConversationStore::group_conversations_with_members_from_domains`].
    QueryGroupConversations,
    /// [`ConversationStore::one_on_one_conversations_with_domain`].
    QueryOneOnOneConversations,
    /// [`UserStore::upsert_user`].
    UpsertUser,
    /// [`UserStore::update_user`].
    UpdateUser,
    /// [`ConnectionStore::upsert_connection`].
    UpsertConnection,
    /// [`ConnectionStore::connections`].
    ListConnections,
    /// [`ConnectionStore::delete_connection`].
    DeleteConnection,
    /// [`MessageStore::insert_message`].
    InsertMessage,
    /// [`UserConfigStore::update_user_config`].
    UpdateUserConfig,
}

#[derive(Debug, Default)]
struct Tables {
    conversations: BTreeMap<ConversationId, Conversation>,
    users: BTreeMap<UserId, User>,
    clients: HashMap<UserId, Vec<Client>>,
    connections: BTreeMap<UserId, Connection>,
    messages: HashMap<ConversationId, Vec<Message>>,
    teams: HashMap<TeamId, Team>,
    config: UserConfig,
}

/// A thread-safe in-memory store.
///
/// Each trait method runs under one lock, so every call is atomic.
/// Failures can be injected per operation with [`MemoryStore::fail_next`],
/// which makes it suitable for exercising partial-failure paths.
///
/// # Example
///
/// ```rust
/// use msgsync_core::store::{ConversationStore, MemoryStore, StoreOp};
/// use msgsync_core::Conversation;
/// use msgsync_protocol::{ConversationId, ConversationType};
///
/// let store = MemoryStore::new();
/// let id = ConversationId::new("c1", "wire.com");
/// store.fail_next(StoreOp::UpsertConversation);
/// assert!(store.upsert_conversation(Conversation::new(id.clone(), ConversationType::Group)).is_err());
/// assert!(store.upsert_conversation(Conversation::new(id.clone(), ConversationType::Group)).is_ok());
/// assert!(store.get_conversation(&id).unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    faults: Mutex<Vec<StoreOp>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `op` fail with a backend error.
    pub fn fail_next(&self, op: StoreOp) {
        self.faults.lock().push(op);
    }

    /// Returns the number of stored conversations.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.tables.read().conversations.len()
    }

    /// Returns the total number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.tables.read().messages.values().map(Vec::len).sum()
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        let mut faults = self.faults.lock();
        match faults.iter().position(|fault| *fault == op) {
            Some(index) => {
                faults.remove(index);
                Err(StoreError::Backend(format!("injected failure in {op:?}")))
            }
            None => Ok(()),
        }
    }
}

impl ConversationStore for MemoryStore {
    fn upsert_conversation(&self, conversation: Conversation) -> StoreResult<()> {
        self.check(StoreOp::UpsertConversation)?;
        self.tables
            .write()
            .conversations
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    fn get_conversation(&self, id: &ConversationId) -> StoreResult<Option<Conversation>> {
        Ok(self.tables.read().conversations.get(id).cloned())
    }

    fn update_conversation(
        &self,
        id: &ConversationId,
        update: &mut dyn FnMut(&mut Conversation),
    ) -> StoreResult<()> {
        self.check(StoreOp::UpdateConversation)?;
        let mut tables = self.tables.write();
        let conversation = tables.conversations.get_mut(id).ok_or(StoreError::NotFound)?;
        update(conversation);
        Ok(())
    }

    fn delete_conversation(&self, id: &ConversationId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        tables
            .conversations
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn conversation_ids(&self) -> StoreResult<Vec<ConversationId>> {
        Ok(self.tables.read().conversations.keys().cloned().collect())
    }

    fn insert_members(
        &self,
        conversation: &ConversationId,
        members: &[Member],
    ) -> StoreResult<usize> {
        self.check(StoreOp::InsertMembers)?;
        let mut tables = self.tables.write();
        let stored = tables
            .conversations
            .get_mut(conversation)
            .ok_or(StoreError::NotFound)?;
        let mut added = 0;
        for member in members {
            if !stored.has_member(&member.id) {
                stored.members.push(member.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    fn delete_members_by_qualified_id(
        &self,
        users: &[UserId],
        conversation: &ConversationId,
    ) -> StoreResult<usize> {
        self.check(StoreOp::DeleteMembers)?;
        let mut tables = self.tables.write();
        let stored = tables
            .conversations
            .get_mut(conversation)
            .ok_or(StoreError::NotFound)?;
        let before = stored.members.len();
        stored.members.retain(|member| !users.contains(&member.id));
        Ok(before - stored.members.len())
    }

    fn update_member_role(
        &self,
        conversation: &ConversationId,
        user: &UserId,
        role: MemberRole,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let member = tables
            .conversations
            .get_mut(conversation)
            .and_then(|stored| stored.members.iter_mut().find(|member| &member.id == user))
            .ok_or(StoreError::NotFound)?;
        member.role = role;
        Ok(())
    }

    fn delete_user_from_group_conversations(
        &self,
        user: &UserId,
    ) -> StoreResult<Vec<ConversationId>> {
        let mut tables = self.tables.write();
        let mut affected = Vec::new();
        for conversation in tables.conversations.values_mut() {
            if conversation.is_group() && conversation.has_member(user) {
                conversation.members.retain(|member| &member.id != user);
                affected.push(conversation.id.clone());
            }
        }
        Ok(affected)
    }

    fn group_conversations_with_members_from_domains(
        &self,
        first: &str,
        second: &str,
    ) -> StoreResult<Vec<Conversation>> {
        self.check(StoreOp::QueryGroupConversations)?;
        let tables = self.tables.read();
        Ok(tables
            .conversations
            .values()
            .filter(|conversation| conversation.is_group())
            .filter(|conversation| {
                let on = |domain: &str| conversation.members.iter().any(|m| m.id.is_on(domain));
                on(first) && on(second)
            })
            .cloned()
            .collect())
    }

    fn one_on_one_conversations_with_domain(&self, domain: &str) -> StoreResult<Vec<Conversation>> {
        self.check(StoreOp::QueryOneOnOneConversations)?;
        let tables = self.tables.read();
        Ok(tables
            .conversations
            .values()
            .filter(|conversation| conversation.conversation_type == ConversationType::OneOnOne)
            .filter(|conversation| conversation.members.iter().any(|m| m.id.is_on(domain)))
            .cloned()
            .collect())
    }
}

impl UserStore for MemoryStore {
    fn upsert_user(&self, user: User) -> StoreResult<()> {
        self.check(StoreOp::UpsertUser)?;
        self.tables.write().users.insert(user.id.clone(), user);
        Ok(())
    }

    fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(id).cloned())
    }

    fn update_user(&self, id: &UserId, update: &mut dyn FnMut(&mut User)) -> StoreResult<()> {
        self.check(StoreOp::UpdateUser)?;
        let mut tables = self.tables.write();
        let user = tables.users.get_mut(id).ok_or(StoreError::NotFound)?;
        update(user);
        Ok(())
    }

    fn upsert_client(&self, client: Client) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let clients = tables.clients.entry(client.user.clone()).or_default();
        match clients.iter_mut().find(|stored| stored.id == client.id) {
            Some(stored) => *stored = client,
            None => clients.push(client),
        }
        Ok(())
    }

    fn remove_client(&self, user: &UserId, client: &ClientId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let clients = tables.clients.get_mut(user).ok_or(StoreError::NotFound)?;
        let before = clients.len();
        clients.retain(|stored| &stored.id != client);
        if clients.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn clients_of(&self, user: &UserId) -> StoreResult<Vec<Client>> {
        Ok(self
            .tables
            .read()
            .clients
            .get(user)
            .cloned()
            .unwrap_or_default())
    }
}

impl ConnectionStore for MemoryStore {
    fn upsert_connection(&self, connection: Connection) -> StoreResult<()> {
        self.check(StoreOp::UpsertConnection)?;
        self.tables
            .write()
            .connections
            .insert(connection.to.clone(), connection);
        Ok(())
    }

    fn get_connection(&self, other: &UserId) -> StoreResult<Option<Connection>> {
        Ok(self.tables.read().connections.get(other).cloned())
    }

    fn connections(&self) -> StoreResult<Vec<Connection>> {
        self.check(StoreOp::ListConnections)?;
        Ok(self.tables.read().connections.values().cloned().collect())
    }

    fn delete_connection(&self, other: &UserId) -> StoreResult<()> {
        self.check(StoreOp::DeleteConnection)?;
        self.tables
            .write()
            .connections
            .remove(other)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

impl MessageStore for MemoryStore {
    fn insert_message(&self, message: Message) -> StoreResult<bool> {
        self.check(StoreOp::InsertMessage)?;
        let mut tables = self.tables.write();
        let messages = tables
            .messages
            .entry(message.conversation.clone())
            .or_default();
        if messages.iter().any(|stored| stored.id == message.id) {
            return Ok(false);
        }
        messages.push(message);
        Ok(true)
    }

    fn get_message(&self, conversation: &ConversationId, id: &str) -> StoreResult<Option<Message>> {
        Ok(self
            .tables
            .read()
            .messages
            .get(conversation)
            .and_then(|messages| messages.iter().find(|stored| stored.id == id))
            .cloned())
    }

    fn messages(&self, conversation: &ConversationId) -> StoreResult<Vec<Message>> {
        Ok(self
            .tables
            .read()
            .messages
            .get(conversation)
            .cloned()
            .unwrap_or_default())
    }

    fn delete_messages(&self, conversation: &ConversationId) -> StoreResult<()> {
        self.tables.write().messages.remove(conversation);
        Ok(())
    }
}

impl TeamStore for MemoryStore {
    fn upsert_team(&self, team: Team) -> StoreResult<()> {
        self.tables.write().teams.insert(team.id.clone(), team);
        Ok(())
    }

    fn get_team(&self, id: &TeamId) -> StoreResult<Option<Team>> {
        Ok(self.tables.read().teams.get(id).cloned())
    }
}

impl UserConfigStore for MemoryStore {
    fn user_config(&self) -> StoreResult<UserConfig> {
        Ok(self.tables.read().config.clone())
    }

    fn update_user_config(&self, update: &mut dyn FnMut(&mut UserConfig)) -> StoreResult<()> {
        self.check(StoreOp::UpdateUserConfig)?;
        update(&mut self.tables.write().config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SystemContent;

    fn uid(name: &str, domain: &str) -> UserId {
        UserId::new(name, domain)
    }

    fn group(id: &str, domain: &str, members: &[UserId]) -> Conversation {
        Conversation::new(ConversationId::new(id, domain), ConversationType::Group).with_members(
            members
                .iter()
                .map(|m| Member::new(m.clone(), MemberRole::Member))
                .collect(),
        )
    }

    #[test]
    fn insert_members_skips_existing() {
        let store = MemoryStore::new();
        let alice = uid("alice", "wire.com");
        let conversation = group("c1", "wire.com", &[alice.clone()]);
        let id = conversation.id.clone();
        store.upsert_conversation(conversation).unwrap();

        let added = store
            .insert_members(
                &id,
                &[
                    Member::new(alice.clone(), MemberRole::Admin),
                    Member::new(uid("bob", "foo.com"), MemberRole::Member),
                ],
            )
            .unwrap();
        assert_eq!(added, 1);
        let stored = store.get_conversation(&id).unwrap().unwrap();
        assert_eq!(stored.members.len(), 2);
        // Existing member keeps their role.
        assert_eq!(stored.role_of(&alice), Some(MemberRole::Member));
    }

    #[test]
    fn updates_on_missing_rows_report_not_found() {
        let store = MemoryStore::new();
        let missing = ConversationId::new("nope", "wire.com");
        assert!(matches!(
            store.update_conversation(&missing, &mut |_| {}),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.delete_connection(&uid("bob", "foo.com")),
            Err(StoreError::NotFound)
        ));
        assert!(store.get_conversation(&missing).unwrap().is_none());
    }

    #[test]
    fn domain_queries() {
        let store = MemoryStore::new();
        let alice = uid("alice", "wire.com");
        let bob = uid("bob", "foo.com");
        let carol = uid("carol", "bar.org");
        store.upsert_conversation(group("g1", "wire.com", &[alice.clone(), bob.clone()])).unwrap();
        store.upsert_conversation(group("g2", "wire.com", &[alice.clone(), carol.clone()])).unwrap();
        store
            .upsert_conversation(
                Conversation::new(ConversationId::new("o1", "wire.com"), ConversationType::OneOnOne)
                    .with_members(vec![
                        Member::new(alice.clone(), MemberRole::Admin),
                        Member::new(bob.clone(), MemberRole::Admin),
                    ]),
            )
            .unwrap();

        let groups = store
            .group_conversations_with_members_from_domains("wire.com", "foo.com")
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id.value, "g1");

        let one_on_ones = store.one_on_one_conversations_with_domain("foo.com").unwrap();
        assert_eq!(one_on_ones.len(), 1);
        assert_eq!(one_on_ones[0].id.value, "o1");
    }

    #[test]
    fn duplicate_message_ids_are_ignored() {
        let store = MemoryStore::new();
        let conversation = ConversationId::new("c1", "wire.com");
        let message = Message::system(
            "m1",
            conversation.clone(),
            uid("alice", "wire.com"),
            "2024-01-01T00:00:00Z",
            SystemContent::HistoryLost,
        );
        assert!(store.insert_message(message.clone()).unwrap());
        assert!(!store.insert_message(message).unwrap());
        assert_eq!(store.messages(&conversation).unwrap().len(), 1);
    }

    #[test]
    fn injected_fault_fires_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::InsertMessage);
        let message = Message::system(
            "m1",
            ConversationId::new("c1", "wire.com"),
            uid("alice", "wire.com"),
            "",
            SystemContent::HistoryLost,
        );
        assert!(matches!(
            store.insert_message(message.clone()),
            Err(StoreError::Backend(_))
        ));
        assert!(store.insert_message(message).unwrap());
    }
}
