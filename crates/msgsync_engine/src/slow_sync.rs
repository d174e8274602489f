//! Slow sync: full state catch-up from backend snapshots.
//!
//! The newest notification id is read before anything else so that changes
//! made while the snapshots are fetched are still delivered by incremental
//! sync afterwards. Stored events at or below that id are covered by the
//! snapshots and are marked processed without being routed.

use crate::context::AccountContext;
use crate::receivers::{apply_feature_config, fetch_unknown_users};
use msgsync_core::boundary::{ApiResultExt, StoreResultExt};
use msgsync_core::{
    Conversation, CoreResult, EventStore, FeatureFailure, Message, SystemContent, Team, User,
};
use msgsync_protocol::{EventId, UserId};

/// What a slow sync stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlowSyncReport {
    /// Cursor persisted at the end, `None` if the backend log was empty.
    pub cursor: Option<EventId>,
    /// Conversations stored.
    pub conversations: usize,
    /// Connections stored.
    pub connections: usize,
    /// Member profiles fetched.
    pub users: usize,
    /// Pending local events covered by the snapshots.
    pub covered_events: usize,
    /// History-lost messages inserted.
    pub history_lost_messages: usize,
}

/// Runs one slow sync attempt for the account of `ctx`.
pub async fn run_slow_sync(ctx: &AccountContext, events: &EventStore) -> CoreResult<SlowSyncReport> {
    if ctx.metadata.current_client_id()?.is_none() {
        return Err(FeatureFailure::MissingClientRegistration.into());
    }
    let mut report = SlowSyncReport::default();

    let cursor = ctx.backend.fetch_last_event_id().await.wrap_api()?;

    let profile = ctx.backend.fetch_self_user().await.wrap_api()?;
    let users = &ctx.storage.users;
    let previous = users.get_user(&profile.id).wrap_storage()?;
    users
        .upsert_user(User::from_profile(&profile, previous.as_ref()))
        .wrap_storage()?;

    let features = ctx.backend.fetch_feature_configs().await.wrap_api()?;
    ctx.storage
        .config
        .update_user_config(&mut |config| {
            for feature in &features {
                apply_feature_config(config, feature);
            }
        })
        .wrap_storage()?;

    for connection in ctx.backend.fetch_connections().await.wrap_api()? {
        ctx.storage
            .connections
            .upsert_connection(connection)
            .wrap_storage()?;
        report.connections += 1;
    }

    let mut member_ids: Vec<UserId> = Vec::new();
    for snapshot in ctx.backend.fetch_conversations().await.wrap_api()? {
        let store = &ctx.storage.conversations;
        let previous = store.get_conversation(&snapshot.id).wrap_storage()?;
        store
            .upsert_conversation(Conversation::from_snapshot(&snapshot, previous.as_ref()))
            .wrap_storage()?;
        member_ids.extend(snapshot.members.iter().map(|m| m.id.clone()));
        report.conversations += 1;
    }
    report.users = fetch_unknown_users(ctx, &member_ids).await?;

    if let Some(team) = &profile.team {
        let snapshot = ctx.backend.fetch_team(team).await.wrap_api()?;
        ctx.storage
            .teams
            .upsert_team(Team::from(&snapshot))
            .wrap_storage()?;
    }

    if let Some(cursor) = &cursor {
        ctx.metadata.set_last_processed_event_id(cursor)?;
        for event in events.snapshot() {
            if !event.processed && event.id <= *cursor {
                events.mark_event_as_processed(&event.id)?;
                report.covered_events += 1;
            }
        }
        events.delete_all_processed_events()?;
    }
    report.cursor = cursor;

    ctx.metadata
        .set_slow_sync_completed_at(&chrono::Utc::now().to_rfc3339())?;

    if ctx.metadata.history_lost_pending()? {
        report.history_lost_messages = insert_history_lost_messages(ctx)?;
        ctx.metadata.set_history_lost_pending(false)?;
    }

    tracing::info!(
        account = %ctx.logger.account(),
        conversations = report.conversations,
        connections = report.connections,
        covered_events = report.covered_events,
        "slow sync finished"
    );
    Ok(report)
}

fn insert_history_lost_messages(ctx: &AccountContext) -> CoreResult<usize> {
    let date = chrono::Utc::now().to_rfc3339();
    let mut inserted = 0;
    for conversation in ctx.storage.conversations.conversation_ids().wrap_storage()? {
        let message = Message::system(
            uuid::Uuid::new_v4().to_string(),
            conversation,
            ctx.self_user.clone(),
            date.clone(),
            SystemContent::HistoryLost,
        );
        if ctx.storage.messages.insert_message(message).wrap_storage()? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOp;
    use crate::receivers::testing::harness;
    use msgsync_core::boundary::ApiError;
    use msgsync_protocol::{
        ClientId, ConversationId, ConversationSnapshot, ConversationType, DomainEvent, Event,
        Member, MemberRole, ProtocolInfo, ReceiptMode, UserProfile,
    };

    fn register(ctx: &AccountContext) {
        ctx.metadata
            .set_current_client_id(&ClientId::new("device"))
            .unwrap();
    }

    fn snapshot(id: &str, members: Vec<Member>) -> ConversationSnapshot {
        ConversationSnapshot {
            id: ConversationId::new(id, "wire.com"),
            name: None,
            conversation_type: ConversationType::Group,
            protocol: ProtocolInfo::Proteus,
            creator: None,
            members,
            access: Vec::new(),
            access_roles: Vec::new(),
            receipt_mode: ReceiptMode::Disabled,
            message_timer_ms: None,
            team: None,
        }
    }

    #[tokio::test]
    async fn unregistered_client_fails() {
        let h = harness();
        let failure = run_slow_sync(&h.ctx, &EventStore::in_memory())
            .await
            .unwrap_err();
        assert!(failure.is_missing_client_registration());
    }

    #[tokio::test]
    async fn stores_snapshots_and_cursor() {
        let h = harness();
        register(&h.ctx);
        let bob = UserId::new("bob", "foo.com");
        h.backend.put_user(UserProfile {
            id: bob.clone(),
            name: "Bob".into(),
            handle: None,
            team: None,
            deleted: false,
        });
        h.backend.put_conversation(snapshot(
            "c1",
            vec![
                Member::new(h.ctx.self_user.clone(), MemberRole::Admin),
                Member::new(bob.clone(), MemberRole::Member),
            ],
        ));
        h.backend.push_events([
            Event::new("0001", DomainEvent::MissedNotifications),
            Event::new("0002", DomainEvent::MissedNotifications),
        ]);

        let events = EventStore::in_memory();
        events
            .insert_events([
                Event::new("0002", DomainEvent::MissedNotifications),
                Event::new("0003", DomainEvent::MissedNotifications),
            ])
            .unwrap();

        let report = run_slow_sync(&h.ctx, &events).await.unwrap();

        assert_eq!(report.cursor, Some(EventId::new("0002")));
        assert_eq!(report.conversations, 1);
        assert_eq!(report.covered_events, 1);
        assert_eq!(
            h.ctx.metadata.last_processed_event_id().unwrap(),
            Some(EventId::new("0002"))
        );
        assert!(h.ctx.metadata.slow_sync_completed_at().unwrap().is_some());
        assert!(h.ctx.storage.users.get_user(&bob).unwrap().is_some());
        assert_eq!(events.len(), 1);
        assert_eq!(events.first_unprocessed().unwrap().id, EventId::new("0003"));
    }

    #[tokio::test]
    async fn pending_history_loss_is_announced_once() {
        let h = harness();
        register(&h.ctx);
        h.backend.put_conversation(snapshot("c1", Vec::new()));
        h.backend.put_conversation(snapshot("c2", Vec::new()));
        h.ctx.metadata.set_history_lost_pending(true).unwrap();

        let events = EventStore::in_memory();
        let report = run_slow_sync(&h.ctx, &events).await.unwrap();
        assert_eq!(report.history_lost_messages, 2);
        assert!(!h.ctx.metadata.history_lost_pending().unwrap());

        let again = run_slow_sync(&h.ctx, &events).await.unwrap();
        assert_eq!(again.history_lost_messages, 0);
    }

    #[tokio::test]
    async fn backend_failure_leaves_marker_unset() {
        let h = harness();
        register(&h.ctx);
        h.backend
            .fail_next(BackendOp::Conversations, ApiError::no_network("offline"));

        let failure = run_slow_sync(&h.ctx, &EventStore::in_memory())
            .await
            .unwrap_err();

        assert!(failure.is_transient());
        assert!(h.ctx.metadata.slow_sync_completed_at().unwrap().is_none());
    }
}
