//! User event receiver.

use super::{EventReceiver, FoundExt};
use crate::context::AccountContext;
use crate::session::LogoutReason;
use async_trait::async_trait;
use msgsync_core::boundary::StoreResultExt;
use msgsync_core::{Client, CoreResult, LegalHoldStatus, User};
use msgsync_protocol::{ClientId, Connection, Event, UserEvent, UserId};

/// Applies user, device and connection events.
#[derive(Debug, Clone)]
pub struct UserEventReceiver {
    ctx: AccountContext,
}

impl UserEventReceiver {
    /// Creates a receiver.
    pub fn new(ctx: AccountContext) -> Self {
        Self { ctx }
    }

    fn on_new_connection(&self, envelope: &Event, connection: &Connection) -> CoreResult<()> {
        self.ctx
            .storage
            .connections
            .upsert_connection(connection.clone())
            .wrap_storage()?;
        self.ctx
            .logger
            .success(envelope, &format!("status={:?}", connection.status));
        Ok(())
    }

    fn on_client_remove(&self, envelope: &Event, client: &ClientId) -> CoreResult<()> {
        let current = self.ctx.metadata.current_client_id()?;
        if current.as_ref() == Some(client) {
            self.ctx.session.logout(LogoutReason::RemovedClient);
            self.ctx.logger.success(envelope, "current client removed");
            return Ok(());
        }
        let removed = self
            .ctx
            .storage
            .users
            .remove_client(&self.ctx.self_user, client)
            .wrap_storage()
            .found()?;
        if removed {
            self.ctx.logger.success(envelope, "other client removed");
        } else {
            self.ctx.logger.skipped(envelope, "client not stored");
        }
        Ok(())
    }

    fn on_user_delete(&self, envelope: &Event, user: &UserId) -> CoreResult<()> {
        if *user == self.ctx.self_user {
            self.ctx.session.logout(LogoutReason::DeletedAccount);
            self.ctx.logger.success(envelope, "self deleted");
            return Ok(());
        }
        self.ctx
            .storage
            .users
            .update_user(user, &mut |stored| stored.deleted = true)
            .wrap_storage()
            .found()?;
        let left = self
            .ctx
            .storage
            .conversations
            .delete_user_from_group_conversations(user)
            .wrap_storage()?;
        self.ctx
            .logger
            .success(envelope, &format!("conversations={}", left.len()));
        Ok(())
    }

    fn on_update(
        &self,
        envelope: &Event,
        user: &UserId,
        name: Option<&String>,
        handle: Option<&String>,
    ) -> CoreResult<()> {
        let updated = self
            .ctx
            .storage
            .users
            .update_user(user, &mut |stored| {
                if let Some(name) = name {
                    stored.name = name.clone();
                }
                if let Some(handle) = handle {
                    stored.handle = Some(handle.clone());
                }
            })
            .wrap_storage()
            .found()?;
        if updated {
            self.ctx.logger.success(envelope, "");
        } else {
            self.ctx.logger.skipped(envelope, "user not stored");
        }
        Ok(())
    }

    fn set_legal_hold(
        &self,
        envelope: &Event,
        user: &UserId,
        status: LegalHoldStatus,
    ) -> CoreResult<()> {
        let users = &self.ctx.storage.users;
        let updated = users
            .update_user(user, &mut |stored| stored.legal_hold = status)
            .wrap_storage()
            .found()?;
        if !updated && *user == self.ctx.self_user {
            let mut stored = User::new(user.clone(), "");
            stored.legal_hold = status;
            users.upsert_user(stored).wrap_storage()?;
        } else if !updated {
            self.ctx.logger.skipped(envelope, "user not stored");
            return Ok(());
        }
        self.ctx
            .logger
            .success(envelope, &format!("legal_hold={status:?}"));
        Ok(())
    }
}

#[async_trait]
impl EventReceiver<UserEvent> for UserEventReceiver {
    async fn on_event(&self, envelope: &Event, event: &UserEvent) -> CoreResult<()> {
        match event {
            UserEvent::NewConnection { connection } => self.on_new_connection(envelope, connection),
            UserEvent::ClientRemove { client } => self.on_client_remove(envelope, client),
            UserEvent::UserDelete { user, .. } => self.on_user_delete(envelope, user),
            UserEvent::Update { user, name, handle } => {
                self.on_update(envelope, user, name.as_ref(), handle.as_ref())
            }
            UserEvent::NewClient { client } => {
                self.ctx
                    .storage
                    .users
                    .upsert_client(Client::from_info(self.ctx.self_user.clone(), client))
                    .wrap_storage()?;
                self.ctx.logger.success(envelope, "");
                Ok(())
            }
            UserEvent::LegalHoldRequest { user, .. } => {
                self.set_legal_hold(envelope, user, LegalHoldStatus::Pending)
            }
            UserEvent::LegalHoldEnabled { user } => {
                self.set_legal_hold(envelope, user, LegalHoldStatus::Enabled)
            }
            UserEvent::LegalHoldDisabled { user } => {
                self.set_legal_hold(envelope, user, LegalHoldStatus::Disabled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::testing::harness;
    use msgsync_core::Conversation;
    use msgsync_protocol::{
        ClientInfo, ConnectionState, ConversationId, ConversationType, DomainEvent, Member,
        MemberRole,
    };

    fn env(event: &UserEvent) -> Event {
        Event::new("0001", DomainEvent::User(event.clone()))
    }

    async fn apply(receiver: &UserEventReceiver, event: UserEvent) -> CoreResult<()> {
        receiver.on_event(&env(&event), &event).await
    }

    #[tokio::test]
    async fn removing_this_device_logs_out() {
        let h = harness();
        h.ctx
            .metadata
            .set_current_client_id(&ClientId::new("mine"))
            .unwrap();
        let receiver = UserEventReceiver::new(h.ctx.clone());

        apply(
            &receiver,
            UserEvent::ClientRemove {
                client: ClientId::new("other"),
            },
        )
        .await
        .unwrap();
        assert!(!h.ctx.session.is_logged_out());

        apply(
            &receiver,
            UserEvent::ClientRemove {
                client: ClientId::new("mine"),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            h.ctx.session.logout_reason(),
            Some(LogoutReason::RemovedClient)
        );
    }

    #[tokio::test]
    async fn deleting_self_logs_out() {
        let h = harness();
        let receiver = UserEventReceiver::new(h.ctx.clone());
        apply(
            &receiver,
            UserEvent::UserDelete {
                user: h.ctx.self_user.clone(),
                timestamp: String::new(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            h.ctx.session.logout_reason(),
            Some(LogoutReason::DeletedAccount)
        );
    }

    #[tokio::test]
    async fn deleting_other_user_scrubs_groups() {
        let h = harness();
        let bob = UserId::new("bob", "foo.com");
        let group = ConversationId::new("g", "wire.com");
        h.ctx
            .storage
            .users
            .upsert_user(User::new(bob.clone(), "Bob"))
            .unwrap();
        h.ctx
            .storage
            .conversations
            .upsert_conversation(
                Conversation::new(group.clone(), ConversationType::Group).with_members(vec![
                    Member::new(h.ctx.self_user.clone(), MemberRole::Admin),
                    Member::new(bob.clone(), MemberRole::Member),
                ]),
            )
            .unwrap();
        let receiver = UserEventReceiver::new(h.ctx.clone());
        let event = UserEvent::UserDelete {
            user: bob.clone(),
            timestamp: String::new(),
        };

        apply(&receiver, event.clone()).await.unwrap();
        apply(&receiver, event).await.unwrap();

        assert!(h.ctx.storage.users.get_user(&bob).unwrap().unwrap().deleted);
        let stored = h
            .ctx
            .storage
            .conversations
            .get_conversation(&group)
            .unwrap()
            .unwrap();
        assert!(!stored.has_member(&bob));
        assert!(!h.ctx.session.is_logged_out());
    }

    #[tokio::test]
    async fn connection_and_client_upserts_are_idempotent() {
        let h = harness();
        let receiver = UserEventReceiver::new(h.ctx.clone());
        let bob = UserId::new("bob", "foo.com");
        let connection = UserEvent::NewConnection {
            connection: Connection {
                from: h.ctx.self_user.clone(),
                to: bob.clone(),
                conversation: ConversationId::new("c", "foo.com"),
                status: ConnectionState::Sent,
                last_update: String::new(),
            },
        };
        let client = UserEvent::NewClient {
            client: ClientInfo {
                id: ClientId::new("laptop"),
                device_type: Some("desktop".into()),
                label: None,
            },
        };
        for _ in 0..2 {
            apply(&receiver, connection.clone()).await.unwrap();
            apply(&receiver, client.clone()).await.unwrap();
        }
        assert_eq!(h.ctx.storage.connections.connections().unwrap().len(), 1);
        assert_eq!(
            h.ctx
                .storage
                .users
                .clients_of(&h.ctx.self_user)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn update_of_unknown_user_is_skipped() {
        let h = harness();
        let receiver = UserEventReceiver::new(h.ctx.clone());
        apply(
            &receiver,
            UserEvent::Update {
                user: UserId::new("ghost", "foo.com"),
                name: Some("Ghost".into()),
                handle: None,
            },
        )
        .await
        .unwrap();
        assert!(h
            .ctx
            .storage
            .users
            .get_user(&UserId::new("ghost", "foo.com"))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn legal_hold_lifecycle() {
        let h = harness();
        let receiver = UserEventReceiver::new(h.ctx.clone());
        let me = h.ctx.self_user.clone();
        apply(
            &receiver,
            UserEvent::LegalHoldRequest {
                user: me.clone(),
                client: ClientId::new("lh"),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            h.ctx.storage.users.get_user(&me).unwrap().unwrap().legal_hold,
            LegalHoldStatus::Pending
        );
        apply(&receiver, UserEvent::LegalHoldEnabled { user: me.clone() })
            .await
            .unwrap();
        assert_eq!(
            h.ctx.storage.users.get_user(&me).unwrap().unwrap().legal_hold,
            LegalHoldStatus::Enabled
        );
    }
}
