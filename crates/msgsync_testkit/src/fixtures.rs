//! Test fixtures.
//!
//! Builders for the values most tests need. Everything here is plain data;
//! nothing talks to a backend or a store.

use msgsync_core::{Conversation, Storage};
use msgsync_protocol::{
    ClientId, Connection, ConnectionState, ConversationEvent, ConversationId, ConversationSnapshot,
    ConversationType, DomainEvent, Event, FederationEvent, Member, MemberLeaveReason, MemberRole,
    ProtocolInfo, ReceiptMode, UserEvent, UserId, UserProfile,
};

/// Domain of the self user in every fixture.
pub const SELF_DOMAIN: &str = "wire.com";

/// Timestamp used by fixture events.
pub const FIXTURE_TIMESTAMP: &str = "2024-05-01T12:00:00Z";

/// The self user.
pub fn self_user() -> UserId {
    UserId::new("self", SELF_DOMAIN)
}

/// A user on `domain`.
pub fn user(value: &str, domain: &str) -> UserId {
    UserId::new(value, domain)
}

/// A profile for `id`, named after its value.
pub fn profile(id: &UserId) -> UserProfile {
    UserProfile {
        id: id.clone(),
        name: id.value.clone(),
        handle: None,
        team: None,
        deleted: false,
    }
}

/// A conversation id on `domain`.
pub fn conversation_id(value: &str, domain: &str) -> ConversationId {
    ConversationId::new(value, domain)
}

/// A Proteus group hosted on `domain`. The first member is an admin.
pub fn group(value: &str, domain: &str, members: &[UserId]) -> ConversationSnapshot {
    snapshot(value, domain, ConversationType::Group, members)
}

/// A 1:1 conversation between the self user and `other`, hosted on the
/// other user's domain.
pub fn one_on_one(other: &UserId) -> ConversationSnapshot {
    snapshot(
        &format!("1on1-{}", other.value),
        &other.domain,
        ConversationType::OneOnOne,
        &[self_user(), other.clone()],
    )
}

fn snapshot(
    value: &str,
    domain: &str,
    conversation_type: ConversationType,
    members: &[UserId],
) -> ConversationSnapshot {
    ConversationSnapshot {
        id: conversation_id(value, domain),
        name: Some(value.to_string()),
        conversation_type,
        protocol: ProtocolInfo::Proteus,
        creator: members.first().cloned(),
        members: members
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let role = if index == 0 {
                    MemberRole::Admin
                } else {
                    MemberRole::Member
                };
                Member::new(id.clone(), role)
            })
            .collect(),
        access: Vec::new(),
        access_roles: Vec::new(),
        receipt_mode: ReceiptMode::Disabled,
        message_timer_ms: None,
        team: None,
    }
}

/// A connection from the self user to `to`.
pub fn connection(to: &UserId, status: ConnectionState) -> Connection {
    Connection {
        from: self_user(),
        to: to.clone(),
        conversation: conversation_id(&format!("1on1-{}", to.value), &to.domain),
        status,
        last_update: FIXTURE_TIMESTAMP.to_string(),
    }
}

/// Stores `snapshots` as local conversations.
///
/// # Panics
///
/// Panics if the store rejects a write.
pub fn seed_conversations(storage: &Storage, snapshots: &[ConversationSnapshot]) {
    for snapshot in snapshots {
        storage
            .conversations
            .upsert_conversation(Conversation::from_snapshot(snapshot, None))
            .expect("Failed to seed conversation");
    }
}

/// Stores a profile for each of `users`.
///
/// # Panics
///
/// Panics if the store rejects a write.
pub fn seed_users(storage: &Storage, users: &[UserId]) {
    for id in users {
        storage
            .users
            .upsert_user(msgsync_core::User::from_profile(&profile(id), None))
            .expect("Failed to seed user");
    }
}

/// A gap signal.
pub fn missed(id: &str) -> Event {
    Event::new(id, DomainEvent::MissedNotifications)
}

/// A rename by the self user.
pub fn renamed(id: &str, conversation: &ConversationId, name: &str) -> Event {
    Event::new(
        id,
        DomainEvent::Conversation(ConversationEvent::Renamed {
            conversation: conversation.clone(),
            from: self_user(),
            name: name.to_string(),
            timestamp: FIXTURE_TIMESTAMP.to_string(),
        }),
    )
}

/// `members` added to `conversation` by the self user.
pub fn member_join(id: &str, conversation: &ConversationId, members: &[UserId]) -> Event {
    Event::new(
        id,
        DomainEvent::Conversation(ConversationEvent::MemberJoin {
            conversation: conversation.clone(),
            from: self_user(),
            members: members
                .iter()
                .map(|member| Member::new(member.clone(), MemberRole::Member))
                .collect(),
            timestamp: FIXTURE_TIMESTAMP.to_string(),
        }),
    )
}

/// `removed` taken out of `conversation` by the self user.
pub fn member_leave(id: &str, conversation: &ConversationId, removed: &[UserId]) -> Event {
    Event::new(
        id,
        DomainEvent::Conversation(ConversationEvent::MemberLeave {
            conversation: conversation.clone(),
            from: self_user(),
            removed: removed.to_vec(),
            reason: MemberLeaveReason::Removed,
            timestamp: FIXTURE_TIMESTAMP.to_string(),
        }),
    )
}

/// Removal of a device of the self user.
pub fn client_remove(id: &str, client: &str) -> Event {
    Event::new(
        id,
        DomainEvent::User(UserEvent::ClientRemove {
            client: ClientId::new(client),
        }),
    )
}

/// The self backend stopped federating with `domain`.
pub fn federation_delete(id: &str, domain: &str) -> Event {
    Event::new(
        id,
        DomainEvent::Federation(FederationEvent::Delete {
            domain: domain.to_string(),
        }),
    )
}

/// Two backends stopped federating with each other.
pub fn connection_removed(id: &str, domains: &[&str]) -> Event {
    Event::new(
        id,
        DomainEvent::Federation(FederationEvent::ConnectionRemoved {
            domains: domains.iter().map(|domain| domain.to_string()).collect(),
        }),
    )
}

/// Serializes `events` the way an event dump file holds them.
///
/// # Panics
///
/// Panics if an event cannot be serialized.
pub fn events_to_json(events: &[Event]) -> String {
    serde_json::to_string_pretty(events).expect("Failed to serialize events")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_creator_is_first_member() {
        let snapshot = group("g", SELF_DOMAIN, &[self_user(), user("bob", "foo.com")]);
        assert_eq!(snapshot.creator, Some(self_user()));
        assert_eq!(snapshot.members[0].role, MemberRole::Admin);
        assert_eq!(snapshot.members[1].role, MemberRole::Member);
    }

    #[test]
    fn one_on_one_is_hosted_by_the_other_side() {
        let bob = user("bob", "foo.com");
        let snapshot = one_on_one(&bob);
        assert!(snapshot.id.is_on("foo.com"));
        assert_eq!(connection(&bob, ConnectionState::Accepted).conversation, snapshot.id);
    }

    #[test]
    fn event_dump_reads_back() {
        let events = vec![missed("0001"), federation_delete("0002", "foo.com")];
        let parsed = Event::list_from_json(&events_to_json(&events)).unwrap();
        assert_eq!(parsed, events);
    }
}
