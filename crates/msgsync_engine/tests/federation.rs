//! End-to-end federation cascade: a live domain removal applied through the
//! coordinator after a slow sync.

use msgsync_core::{
    EventStore, FederationStopReason, Message, MessageContent, Storage, SystemContent,
};
use msgsync_engine::{
    CryptoClients, MockBackend, MockCrypto, RetryConfig, Session, SyncConfig, SyncCoordinator,
};
use msgsync_protocol::{ClientId, ConnectionState, ConversationId, Event, EventId, UserId};
use msgsync_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct World {
    alice: UserId,
    bob: UserId,
    carol: UserId,
    dave: UserId,
    self_hosted: ConversationId,
    foo_hosted: ConversationId,
    bar_hosted: ConversationId,
    direct: ConversationId,
}

fn world(backend: &MockBackend) -> World {
    let alice = user("alice", SELF_DOMAIN);
    let bob = user("bob", "foo.com");
    let carol = user("carol", "bar.org");
    let dave = user("dave", "foo.com");
    for id in [&alice, &bob, &carol, &dave] {
        backend.put_user(profile(id));
    }

    let self_hosted = group(
        "planning",
        SELF_DOMAIN,
        &[self_user(), alice.clone(), bob.clone(), carol.clone()],
    );
    let foo_hosted = group("foo-room", "foo.com", &[bob.clone(), self_user(), alice.clone()]);
    let bar_hosted = group("bar-room", "bar.org", &[carol.clone(), self_user()]);
    let direct = one_on_one(&bob);
    for snapshot in [&self_hosted, &foo_hosted, &bar_hosted, &direct] {
        backend.put_conversation(snapshot.clone());
    }
    backend.put_connection(connection(&bob, ConnectionState::Accepted));
    backend.put_connection(connection(&dave, ConnectionState::Sent));
    backend.put_connection(connection(&carol, ConnectionState::Pending));

    World {
        alice,
        bob,
        carol,
        dave,
        self_hosted: self_hosted.id,
        foo_hosted: foo_hosted.id,
        bar_hosted: bar_hosted.id,
        direct: direct.id,
    }
}

fn coordinator(backend: MockBackend) -> Arc<SyncCoordinator<MockBackend>> {
    let events = EventStore::in_memory();
    events
        .metadata()
        .set_current_client_id(&ClientId::new("device"))
        .unwrap();
    Arc::new(SyncCoordinator::new(
        SyncConfig::new(self_user()).with_event_retry(RetryConfig::immediate(3)),
        backend,
        events,
        Storage::in_memory(),
        CryptoClients::mock(Arc::new(MockCrypto::new())),
        Session::new(),
    ))
}

fn members(storage: &Storage, id: &ConversationId) -> Vec<UserId> {
    storage
        .conversations
        .get_conversation(id)
        .unwrap()
        .unwrap()
        .members
        .into_iter()
        .map(|member| member.id)
        .collect()
}

fn federation_messages(storage: &Storage, id: &ConversationId) -> Vec<Message> {
    storage
        .messages
        .messages(id)
        .unwrap()
        .into_iter()
        .filter(|message| {
            matches!(
                message.content,
                MessageContent::System(SystemContent::FederationStopped { .. })
            )
        })
        .collect()
}

async fn deliver(coordinator: &SyncCoordinator<MockBackend>, event: Event) {
    let id = event.id.clone();
    coordinator.backend().push_events([event.clone()]);
    coordinator.events().insert_events([event.live()]).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.events().metadata().last_processed_event_id().unwrap() != Some(id.clone())
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("event was not processed");
}

#[tokio::test]
async fn domain_removal_repairs_local_state() {
    let backend = MockBackend::new(profile(&self_user()));
    let w = world(&backend);
    backend.push_events([missed("0001")]);
    let coordinator = coordinator(backend);

    let runner = coordinator.clone();
    let task = tokio::spawn(async move { runner.run().await });
    coordinator.wait_until_live().await.unwrap();

    deliver(&coordinator, federation_delete("0002", "foo.com")).await;
    let storage = coordinator.storage();

    // Self-hosted group keeps its own side and bar.org, drops foo.com.
    assert_eq!(
        members(storage, &w.self_hosted),
        vec![self_user(), w.alice.clone(), w.carol.clone()]
    );
    let notices = federation_messages(storage, &w.self_hosted);
    assert_eq!(notices.len(), 1);
    assert_eq!(
        notices[0].content,
        MessageContent::System(SystemContent::FederationStopped {
            reason: FederationStopReason::DomainRemoved("foo.com".into()),
            removed: vec![w.bob.clone()],
        })
    );

    // The foo.com-hosted group keeps foo.com and drops the self domain.
    assert_eq!(members(storage, &w.foo_hosted), vec![w.bob.clone()]);

    // Unrelated conversations are untouched.
    assert_eq!(
        members(storage, &w.bar_hosted),
        vec![w.carol.clone(), self_user()]
    );
    assert!(federation_messages(storage, &w.bar_hosted).is_empty());

    // 1:1 history stays, the user is marked.
    assert_eq!(members(storage, &w.direct).len(), 2);
    assert_eq!(federation_messages(storage, &w.direct).len(), 1);
    let bob = storage.users.get_user(&w.bob).unwrap().unwrap();
    assert!(bob.defederated);

    // Only the request to foo.com is gone.
    let remaining: Vec<UserId> = storage
        .connections
        .connections()
        .unwrap()
        .into_iter()
        .map(|connection| connection.to)
        .collect();
    assert!(remaining.contains(&w.bob));
    assert!(remaining.contains(&w.carol));
    assert!(!remaining.contains(&w.dave));

    coordinator.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn replayed_removal_changes_nothing() {
    let backend = MockBackend::new(profile(&self_user()));
    let w = world(&backend);
    backend.push_events([missed("0001")]);
    let coordinator = coordinator(backend);

    let runner = coordinator.clone();
    let task = tokio::spawn(async move { runner.run().await });
    coordinator.wait_until_live().await.unwrap();

    deliver(&coordinator, federation_delete("0002", "foo.com")).await;
    let storage = coordinator.storage();
    let members_before = members(storage, &w.self_hosted);
    let messages_before = storage.messages.messages(&w.self_hosted).unwrap().len();

    // Same removal again under a new id, as a second backend notification.
    deliver(&coordinator, federation_delete("0003", "foo.com")).await;

    assert_eq!(members(storage, &w.self_hosted), members_before);
    assert_eq!(
        storage.messages.messages(&w.self_hosted).unwrap().len(),
        messages_before
    );

    coordinator.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn connection_removal_between_foreign_domains() {
    let backend = MockBackend::new(profile(&self_user()));
    let w = world(&backend);
    backend.push_events([missed("0001")]);
    let coordinator = coordinator(backend);

    let runner = coordinator.clone();
    let task = tokio::spawn(async move { runner.run().await });
    coordinator.wait_until_live().await.unwrap();

    deliver(&coordinator, connection_removed("0002", &["foo.com", "bar.org"])).await;
    let storage = coordinator.storage();

    // Hosted on neither side: both foreign sides go.
    assert_eq!(
        members(storage, &w.self_hosted),
        vec![self_user(), w.alice.clone()]
    );
    // Hosted on bar.org with no foo.com members: untouched.
    assert_eq!(
        members(storage, &w.bar_hosted),
        vec![w.carol.clone(), self_user()]
    );
    // Connections are not part of a connection removal.
    assert_eq!(storage.connections.connections().unwrap().len(), 3);
    assert_eq!(
        coordinator.events().metadata().last_processed_event_id().unwrap(),
        Some(EventId::new("0002"))
    );

    coordinator.stop();
    task.await.unwrap().unwrap();
}
