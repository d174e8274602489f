//! Federation cascade handler.
//!
//! When the self backend stops federating with a domain, or two other
//! backends stop federating with each other, local state that spans the
//! affected domains is repaired in independent steps:
//!
//! - `connections`: pending and sent connection requests to the removed
//!   domain are deleted.
//! - `one_on_one`: 1:1 conversations with users of the removed domain get a
//!   system message and the users are marked defederated. History stays.
//! - `groups`: group conversations with members from both domains lose the
//!   members on the side opposite to the conversation's own domain, then get
//!   a system message naming who was removed.
//!
//! A failing step does not stop the others. Each step's outcome is logged
//! through the [`EventLogger`](crate::logging::EventLogger) and the event is
//! reported as handled. Member removal and the system message are separate
//! writes; a failed message does not undo the removal.

use super::{first_failure, system_message, EventReceiver, FoundExt};
use crate::context::AccountContext;
use async_trait::async_trait;
use msgsync_core::boundary::StoreResultExt;
use msgsync_core::{Conversation, CoreFailure, CoreResult, FederationStopReason, SystemContent};
use msgsync_protocol::{Event, FederationEvent, UserId};

/// Returns the members to drop from `conversation` when `first` and `second`
/// stop federating.
///
/// A conversation hosted on one of the two domains keeps that side and
/// drops the other. A conversation hosted elsewhere drops both.
#[must_use]
pub fn members_to_remove(conversation: &Conversation, first: &str, second: &str) -> Vec<UserId> {
    let host = conversation.id.domain.as_str();
    conversation
        .members
        .iter()
        .map(|member| &member.id)
        .filter(|id| {
            if host == first {
                id.is_on(second)
            } else if host == second {
                id.is_on(first)
            } else {
                id.is_on(first) || id.is_on(second)
            }
        })
        .cloned()
        .collect()
}

/// Applies federation events.
#[derive(Debug, Clone)]
pub struct FederationEventReceiver {
    ctx: AccountContext,
}

impl FederationEventReceiver {
    /// Creates a receiver.
    pub fn new(ctx: AccountContext) -> Self {
        Self { ctx }
    }

    fn on_domain_deleted(&self, envelope: &Event, domain: &str) {
        let connections = self.remove_connection_requests(domain);
        self.ctx.logger.branch(envelope, "connections", &connections);

        let one_on_one = self.stop_one_on_one_conversations(envelope, domain);
        self.ctx.logger.branch(envelope, "one_on_one", &one_on_one);

        let self_domain = self.ctx.self_domain().to_string();
        let groups = self.prune_group_conversations(
            envelope,
            &self_domain,
            domain,
            &FederationStopReason::DomainRemoved(domain.to_string()),
        );
        self.ctx.logger.branch(envelope, "groups", &groups);

        self.ctx.logger.success(envelope, "");
    }

    fn on_connection_removed(&self, envelope: &Event, domains: &[String]) {
        let [first, second] = domains else {
            self.ctx.logger.rejected(
                envelope,
                &format!("expected two domains, got {}", domains.len()),
            );
            return;
        };
        let groups = self.prune_group_conversations(
            envelope,
            first,
            second,
            &FederationStopReason::ConnectionRemoved(domains.to_vec()),
        );
        self.ctx.logger.branch(envelope, "groups", &groups);
        self.ctx.logger.success(envelope, "");
    }

    fn remove_connection_requests(&self, domain: &str) -> CoreResult<usize> {
        let store = &self.ctx.storage.connections;
        let mut failure = None;
        let mut removed = 0;
        for connection in store.connections().wrap_storage()? {
            if !connection.to.is_on(domain) || !connection.status.is_request() {
                continue;
            }
            match store.delete_connection(&connection.to).wrap_storage().found() {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => first_failure(&mut failure, err),
            }
        }
        failure.map_or(Ok(removed), Err)
    }

    fn stop_one_on_one_conversations(&self, envelope: &Event, domain: &str) -> CoreResult<usize> {
        let conversations = self
            .ctx
            .storage
            .conversations
            .one_on_one_conversations_with_domain(domain)
            .wrap_storage()?;
        let mut failure = None;
        for conversation in &conversations {
            let message = system_message(
                envelope,
                &conversation.id,
                &self.ctx.self_user,
                "",
                SystemContent::FederationStopped {
                    reason: FederationStopReason::DomainRemoved(domain.to_string()),
                    removed: Vec::new(),
                },
            );
            if let Err(err) = self.ctx.storage.messages.insert_message(message).wrap_storage() {
                first_failure(&mut failure, err);
            }
            for member in conversation.members.iter().filter(|m| m.id.is_on(domain)) {
                let marked = self
                    .ctx
                    .storage
                    .users
                    .update_user(&member.id, &mut |user| user.defederated = true)
                    .wrap_storage()
                    .found();
                if let Err(err) = marked {
                    first_failure(&mut failure, err);
                }
            }
        }
        failure.map_or(Ok(conversations.len()), Err)
    }

    fn prune_group_conversations(
        &self,
        envelope: &Event,
        first: &str,
        second: &str,
        reason: &FederationStopReason,
    ) -> CoreResult<usize> {
        let conversations = self
            .ctx
            .storage
            .conversations
            .group_conversations_with_members_from_domains(first, second)
            .wrap_storage()?;
        let mut failure: Option<CoreFailure> = None;
        let mut pruned = 0;
        for conversation in &conversations {
            let removed = members_to_remove(conversation, first, second);
            if removed.is_empty() {
                continue;
            }
            if let Err(err) = self
                .ctx
                .storage
                .conversations
                .delete_members_by_qualified_id(&removed, &conversation.id)
                .wrap_storage()
            {
                first_failure(&mut failure, err);
                continue;
            }
            pruned += 1;

            let message = system_message(
                envelope,
                &conversation.id,
                &self.ctx.self_user,
                "",
                SystemContent::FederationStopped {
                    reason: reason.clone(),
                    removed,
                },
            );
            if let Err(err) = self.ctx.storage.messages.insert_message(message).wrap_storage() {
                first_failure(&mut failure, err);
            }
        }
        failure.map_or(Ok(pruned), Err)
    }
}

#[async_trait]
impl EventReceiver<FederationEvent> for FederationEventReceiver {
    async fn on_event(&self, envelope: &Event, event: &FederationEvent) -> CoreResult<()> {
        match event {
            FederationEvent::Delete { domain } => self.on_domain_deleted(envelope, domain),
            FederationEvent::ConnectionRemoved { domains } => {
                self.on_connection_removed(envelope, domains);
            }
        }
        Ok(())
    }
}
