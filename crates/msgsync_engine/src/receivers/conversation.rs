//! Conversation event receiver.

use super::{
    fetch_unknown_users, system_message, EventReceiver, FoundExt, MessageEventReceiver,
};
use crate::context::AccountContext;
use crate::crypto::CryptoClients;
use async_trait::async_trait;
use msgsync_core::boundary::{ApiResultExt, StoreResultExt};
use msgsync_core::{Conversation, CoreResult, ProtocolState, SystemContent};
use msgsync_protocol::{
    ConversationEvent, ConversationId, ConversationSnapshot, Event, Member, MemberChange,
    MemberLeaveReason, ReceiptMode, UserId,
};

/// Applies conversation events.
///
/// Message variants are handed to a [`MessageEventReceiver`]; everything else
/// is applied here.
#[derive(Debug, Clone)]
pub struct ConversationEventReceiver {
    ctx: AccountContext,
    messages: MessageEventReceiver,
}

impl ConversationEventReceiver {
    /// Creates a receiver.
    pub fn new(ctx: AccountContext, crypto: CryptoClients) -> Self {
        Self {
            messages: MessageEventReceiver::new(ctx.clone(), crypto),
            ctx,
        }
    }

    async fn on_new_conversation(
        &self,
        envelope: &Event,
        snapshot: &ConversationSnapshot,
        from: Option<&UserId>,
        timestamp: &str,
    ) -> CoreResult<()> {
        let store = &self.ctx.storage.conversations;
        let previous = store.get_conversation(&snapshot.id).wrap_storage()?;
        store
            .upsert_conversation(Conversation::from_snapshot(snapshot, previous.as_ref()))
            .wrap_storage()?;

        let member_ids: Vec<UserId> = snapshot.members.iter().map(|m| m.id.clone()).collect();
        fetch_unknown_users(&self.ctx, &member_ids).await?;

        let sender = from
            .or(snapshot.creator.as_ref())
            .unwrap_or(&self.ctx.self_user);
        self.ctx
            .storage
            .messages
            .insert_message(system_message(
                envelope,
                &snapshot.id,
                sender,
                timestamp,
                SystemContent::ConversationCreated,
            ))
            .wrap_storage()?;

        let info = if previous.is_some() { "updated" } else { "created" };
        self.ctx.logger.success(envelope, info);
        Ok(())
    }

    fn on_deleted_conversation(&self, envelope: &Event, id: &ConversationId) -> CoreResult<()> {
        let deleted = self
            .ctx
            .storage
            .conversations
            .delete_conversation(id)
            .wrap_storage()
            .found()?;
        self.ctx.storage.messages.delete_messages(id).wrap_storage()?;
        if deleted {
            self.ctx.logger.success(envelope, "");
        } else {
            self.ctx.logger.skipped(envelope, "conversation not stored");
        }
        Ok(())
    }

    /// Applies `change` to a stored conversation and writes `message` if it existed.
    fn update_with_message(
        &self,
        envelope: &Event,
        id: &ConversationId,
        change: &mut dyn FnMut(&mut Conversation),
        message: Option<(&UserId, &str, SystemContent)>,
    ) -> CoreResult<()> {
        let updated = self
            .ctx
            .storage
            .conversations
            .update_conversation(id, change)
            .wrap_storage()
            .found()?;
        if !updated {
            self.ctx.logger.skipped(envelope, "conversation not stored");
            return Ok(());
        }
        if let Some((sender, timestamp, content)) = message {
            self.ctx
                .storage
                .messages
                .insert_message(system_message(envelope, id, sender, timestamp, content))
                .wrap_storage()?;
        }
        self.ctx.logger.success(envelope, "");
        Ok(())
    }

    /// Stores the conversation from the backend if it is unknown locally.
    ///
    /// Returns false when the backend does not know it either.
    async fn ensure_conversation(&self, id: &ConversationId) -> CoreResult<bool> {
        let store = &self.ctx.storage.conversations;
        if store.get_conversation(id).wrap_storage()?.is_some() {
            return Ok(true);
        }
        let snapshot = match self.ctx.backend.fetch_conversation(id).await.wrap_api() {
            Ok(snapshot) => snapshot,
            Err(failure) if failure.is_invalid_request_error() => return Ok(false),
            Err(failure) => return Err(failure),
        };
        store
            .upsert_conversation(Conversation::from_snapshot(&snapshot, None))
            .wrap_storage()?;
        Ok(true)
    }

    async fn on_member_join(
        &self,
        envelope: &Event,
        id: &ConversationId,
        from: &UserId,
        members: &[Member],
        timestamp: &str,
    ) -> CoreResult<()> {
        if !self.ensure_conversation(id).await? {
            self.ctx.logger.skipped(envelope, "conversation unknown to backend");
            return Ok(());
        }
        let added = self
            .ctx
            .storage
            .conversations
            .insert_members(id, members)
            .wrap_storage()?;

        let member_ids: Vec<UserId> = members.iter().map(|m| m.id.clone()).collect();
        fetch_unknown_users(&self.ctx, &member_ids).await?;

        self.ctx
            .storage
            .messages
            .insert_message(system_message(
                envelope,
                id,
                from,
                timestamp,
                SystemContent::MemberJoined {
                    members: member_ids,
                },
            ))
            .wrap_storage()?;
        self.ctx.logger.success(envelope, &format!("added={added}"));
        Ok(())
    }

    fn on_member_leave(
        &self,
        envelope: &Event,
        id: &ConversationId,
        from: &UserId,
        removed: &[UserId],
        reason: MemberLeaveReason,
        timestamp: &str,
    ) -> CoreResult<()> {
        let deleted = match self
            .ctx
            .storage
            .conversations
            .delete_members_by_qualified_id(removed, id)
            .wrap_storage()
        {
            Ok(deleted) => deleted,
            Err(failure) if failure.is_data_not_found() => {
                self.ctx.logger.skipped(envelope, "conversation not stored");
                return Ok(());
            }
            Err(failure) => return Err(failure),
        };

        if reason == MemberLeaveReason::UserDeleted {
            for user in removed {
                self.ctx
                    .storage
                    .users
                    .update_user(user, &mut |stored| stored.deleted = true)
                    .wrap_storage()
                    .found()?;
            }
        }

        self.ctx
            .storage
            .messages
            .insert_message(system_message(
                envelope,
                id,
                from,
                timestamp,
                SystemContent::MemberLeft {
                    members: removed.to_vec(),
                },
            ))
            .wrap_storage()?;
        self.ctx.logger.success(envelope, &format!("removed={deleted}"));
        Ok(())
    }

    fn on_member_changed(
        &self,
        envelope: &Event,
        id: &ConversationId,
        change: &MemberChange,
    ) -> CoreResult<()> {
        match change {
            MemberChange::Role { member, role } => {
                let updated = self
                    .ctx
                    .storage
                    .conversations
                    .update_member_role(id, member, *role)
                    .wrap_storage()
                    .found()?;
                if updated {
                    self.ctx.logger.success(envelope, "role");
                } else {
                    self.ctx.logger.skipped(envelope, "member not stored");
                }
                Ok(())
            }
            MemberChange::MutedStatus { status, .. } => {
                let status = *status;
                self.update_with_message(envelope, id, &mut |c| c.muted = status, None)
            }
            MemberChange::Archived { archived } => {
                let archived = *archived;
                self.update_with_message(envelope, id, &mut |c| c.archived = archived, None)
            }
            MemberChange::Ignored => {
                self.ctx.logger.skipped(envelope, "member change not tracked");
                Ok(())
            }
        }
    }

    async fn on_protocol_changed(
        &self,
        envelope: &Event,
        id: &ConversationId,
        from: &UserId,
    ) -> CoreResult<()> {
        let Some(stored) = self
            .ctx
            .storage
            .conversations
            .get_conversation(id)
            .wrap_storage()?
        else {
            self.ctx.logger.skipped(envelope, "conversation not stored");
            return Ok(());
        };
        let snapshot = self.ctx.backend.fetch_conversation(id).await.wrap_api()?;
        let protocol = ProtocolState::from_info(&snapshot.protocol, Some(&stored.protocol));
        let name = protocol.protocol();
        self.update_with_message(
            envelope,
            id,
            &mut |c| c.protocol = protocol.clone(),
            Some((from, "", SystemContent::ProtocolChanged { protocol: name })),
        )
    }
}

#[async_trait]
impl EventReceiver<ConversationEvent> for ConversationEventReceiver {
    async fn on_event(&self, envelope: &Event, event: &ConversationEvent) -> CoreResult<()> {
        match event {
            ConversationEvent::NewConversation {
                conversation,
                from,
                timestamp,
            } => {
                self.on_new_conversation(envelope, conversation, from.as_ref(), timestamp)
                    .await
            }
            ConversationEvent::DeletedConversation { conversation, .. } => {
                self.on_deleted_conversation(envelope, conversation)
            }
            ConversationEvent::Renamed {
                conversation,
                from,
                name,
                timestamp,
            } => self.update_with_message(
                envelope,
                conversation,
                &mut |c| c.name = Some(name.clone()),
                Some((
                    from,
                    timestamp,
                    SystemContent::ConversationRenamed { name: name.clone() },
                )),
            ),
            ConversationEvent::MemberJoin {
                conversation,
                from,
                members,
                timestamp,
            } => {
                self.on_member_join(envelope, conversation, from, members, timestamp)
                    .await
            }
            ConversationEvent::MemberLeave {
                conversation,
                from,
                removed,
                reason,
                timestamp,
            } => self.on_member_leave(envelope, conversation, from, removed, *reason, timestamp),
            ConversationEvent::MemberChanged {
                conversation,
                change,
            } => self.on_member_changed(envelope, conversation, change),
            ConversationEvent::NewMessage {
                conversation,
                from,
                sender_client,
                content,
                timestamp,
            } => self.messages.decrypt_proteus(
                envelope,
                conversation,
                from,
                sender_client,
                content,
                timestamp,
            ),
            ConversationEvent::NewMlsMessage {
                conversation,
                from,
                sub_conversation,
                content,
                timestamp,
            } => self.messages.decrypt_mls(
                envelope,
                conversation,
                from,
                sub_conversation.as_deref(),
                content,
                timestamp,
            ),
            ConversationEvent::MlsWelcome {
                conversation,
                welcome,
                ..
            } => {
                self.messages
                    .process_welcome(envelope, conversation, welcome)
                    .await
            }
            ConversationEvent::AccessUpdate {
                conversation,
                access,
                access_roles,
                ..
            } => self.update_with_message(
                envelope,
                conversation,
                &mut |c| {
                    c.access = access.clone();
                    c.access_roles = access_roles.clone();
                },
                None,
            ),
            ConversationEvent::ReceiptModeUpdate {
                conversation,
                from,
                receipt_mode,
                timestamp,
            } => {
                let mode = *receipt_mode;
                self.update_with_message(
                    envelope,
                    conversation,
                    &mut |c| c.receipt_mode = mode,
                    Some((
                        from,
                        timestamp,
                        SystemContent::ReceiptModeChanged {
                            enabled: mode == ReceiptMode::Enabled,
                        },
                    )),
                )
            }
            ConversationEvent::MessageTimerUpdate {
                conversation,
                from,
                message_timer_ms,
                timestamp,
            } => {
                let timer = *message_timer_ms;
                self.update_with_message(
                    envelope,
                    conversation,
                    &mut |c| c.message_timer_ms = timer,
                    Some((
                        from,
                        timestamp,
                        SystemContent::MessageTimerChanged { timer_ms: timer },
                    )),
                )
            }
            ConversationEvent::CodeUpdated { conversation, .. } => self.update_with_message(
                envelope,
                conversation,
                &mut |c| c.has_guest_link = true,
                None,
            ),
            ConversationEvent::CodeDeleted { conversation } => self.update_with_message(
                envelope,
                conversation,
                &mut |c| c.has_guest_link = false,
                None,
            ),
            ConversationEvent::Typing { .. } => {
                self.ctx.logger.success(envelope, "typing");
                Ok(())
            }
            ConversationEvent::ProtocolChanged {
                conversation, from, ..
            } => self.on_protocol_changed(envelope, conversation, from).await,
        }
    }
}
