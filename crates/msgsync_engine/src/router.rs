//! Event router.

use crate::context::AccountContext;
use crate::crypto::CryptoClients;
use crate::receivers::{
    ConversationEventReceiver, EventReceiver, FeatureConfigEventReceiver,
    FederationEventReceiver, MissedNotificationsReceiver, TeamEventReceiver, UserEventReceiver,
    UserPropertyEventReceiver,
};
use async_trait::async_trait;
use msgsync_core::CoreResult;
use msgsync_protocol::{DomainEvent, Event};

/// Handles one event envelope.
///
/// The coordinator calls this for each event in id order and never calls it
/// concurrently for the same account.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles `event`.
    async fn handle(&self, event: &Event) -> CoreResult<()>;
}

/// Routes an envelope to the receiver of its category.
#[derive(Debug, Clone)]
pub struct EventRouter {
    ctx: AccountContext,
    conversations: ConversationEventReceiver,
    users: UserEventReceiver,
    teams: TeamEventReceiver,
    federation: FederationEventReceiver,
    feature_configs: FeatureConfigEventReceiver,
    user_properties: UserPropertyEventReceiver,
    missed: MissedNotificationsReceiver,
}

impl EventRouter {
    /// Creates a router with one receiver per category.
    pub fn new(ctx: AccountContext, crypto: CryptoClients, history_lost_messages: bool) -> Self {
        Self {
            conversations: ConversationEventReceiver::new(ctx.clone(), crypto),
            users: UserEventReceiver::new(ctx.clone()),
            teams: TeamEventReceiver::new(ctx.clone()),
            federation: FederationEventReceiver::new(ctx.clone()),
            feature_configs: FeatureConfigEventReceiver::new(ctx.clone()),
            user_properties: UserPropertyEventReceiver::new(ctx.clone()),
            missed: MissedNotificationsReceiver::new(ctx.clone(), history_lost_messages),
            ctx,
        }
    }
}

#[async_trait]
impl EventHandler for EventRouter {
    async fn handle(&self, event: &Event) -> CoreResult<()> {
        match &event.payload {
            DomainEvent::Conversation(inner) => self.conversations.on_event(event, inner).await,
            DomainEvent::User(inner) => self.users.on_event(event, inner).await,
            DomainEvent::Team(inner) => self.teams.on_event(event, inner).await,
            DomainEvent::Federation(inner) => self.federation.on_event(event, inner).await,
            DomainEvent::FeatureConfig(inner) => self.feature_configs.on_event(event, inner).await,
            DomainEvent::UserProperty(inner) => self.user_properties.on_event(event, inner).await,
            DomainEvent::MissedNotifications => self.missed.on_missed(event),
            DomainEvent::Unknown(unknown) => {
                self.ctx.logger.skipped(event, &unknown.reason);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MockCrypto;
    use crate::receivers::testing::harness;
    use msgsync_protocol::{FeatureConfigEvent, FeatureStatus, UnknownEvent};
    use std::sync::Arc;

    fn router(ctx: AccountContext) -> EventRouter {
        EventRouter::new(ctx, CryptoClients::mock(Arc::new(MockCrypto::new())), true)
    }

    #[tokio::test]
    async fn unknown_payload_is_handled_without_effect() {
        let h = harness();
        let event = Event::new(
            "0001",
            DomainEvent::Unknown(UnknownEvent {
                kind: Some("conversation.future-thing".into()),
                reason: "unknown variant".into(),
            }),
        );
        router(h.ctx.clone()).handle(&event).await.unwrap();
        assert_eq!(h.store.conversation_count(), 0);
    }

    #[tokio::test]
    async fn missed_notifications_request_slow_sync() {
        let h = harness();
        let event = Event::new("0001", DomainEvent::MissedNotifications);
        router(h.ctx.clone()).handle(&event).await.unwrap();
        assert!(h.ctx.requests.is_requested());
    }

    #[tokio::test]
    async fn feature_config_reaches_its_receiver() {
        let h = harness();
        let event = Event::new(
            "0001",
            DomainEvent::FeatureConfig(FeatureConfigEvent::GuestRoomLinkUpdated {
                status: FeatureStatus::Enabled,
            }),
        );
        router(h.ctx.clone()).handle(&event).await.unwrap();
        assert!(h.ctx.storage.config.user_config().unwrap().guest_links_enabled);
    }
}
