//! Encrypted message handling.
//!
//! Decryption failures are part of normal operation: duplicates and stale
//! handshake messages are dropped, an epoch mismatch marks the group out of
//! sync, and anything else leaves a failed-decryption placeholder in the
//! conversation. Only storage failures reach the coordinator.
//!
//! Decryption consumes crypto state, so a ciphertext is decrypted at most
//! once. The result is held per event until it is stored; a retry after a
//! storage failure stores the held result instead of decrypting again.

use super::message_date;
use crate::context::AccountContext;
use crate::crypto::{CryptoClients, MlsDecrypted};
use msgsync_core::boundary::{ApiResultExt, CryptoResultExt, StoreResultExt};
use msgsync_core::{
    Conversation, CoreFailure, CoreResult, GroupState, Message, MessageContent, MlsFailure,
    ProteusErrorCode, ProtocolState,
};
use msgsync_protocol::{ClientId, ConversationId, Event, EventId, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// What to do with a message the MLS layer could not decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlsFailureResolution {
    /// Drop the message silently.
    Ignore,
    /// The local group fell behind; mark it for repair.
    OutOfSync,
    /// Store a failed-decryption placeholder.
    InformUser,
}

/// Classifies an MLS decryption failure.
#[must_use]
pub fn resolve_mls_failure(failure: &MlsFailure) -> MlsFailureResolution {
    match failure {
        MlsFailure::DuplicateMessage
        | MlsFailure::SelfCommitIgnored
        | MlsFailure::BufferedFutureMessage
        | MlsFailure::StaleProposal
        | MlsFailure::StaleCommit
        | MlsFailure::MessageEpochTooOld
        | MlsFailure::CommitForMissingProposal
        | MlsFailure::UnmergedPendingGroup => MlsFailureResolution::Ignore,
        MlsFailure::WrongEpoch => MlsFailureResolution::OutOfSync,
        _ => MlsFailureResolution::InformUser,
    }
}

#[derive(Debug, Clone)]
enum Decrypted {
    Proteus(String),
    Mls(MlsDecrypted),
}

/// Decrypts Proteus and MLS messages and processes MLS welcomes.
#[derive(Debug, Clone)]
pub struct MessageEventReceiver {
    ctx: AccountContext,
    crypto: CryptoClients,
    unstored: Arc<Mutex<HashMap<EventId, Decrypted>>>,
}

impl MessageEventReceiver {
    /// Creates a receiver.
    pub fn new(ctx: AccountContext, crypto: CryptoClients) -> Self {
        Self {
            ctx,
            crypto,
            unstored: Arc::default(),
        }
    }

    fn held(&self, envelope: &Event) -> Option<Decrypted> {
        self.unstored.lock().get(&envelope.id).cloned()
    }

    fn hold(&self, envelope: &Event, decrypted: Decrypted) {
        self.unstored.lock().insert(envelope.id.clone(), decrypted);
    }

    fn release(&self, envelope: &Event) {
        self.unstored.lock().remove(&envelope.id);
    }

    fn already_stored(&self, envelope: &Event, conversation: &ConversationId) -> CoreResult<bool> {
        let stored = self
            .ctx
            .storage
            .messages
            .get_message(conversation, envelope.id.as_str())
            .wrap_storage()?
            .is_some();
        if stored {
            self.release(envelope);
            self.ctx.logger.skipped(envelope, "message already stored");
        }
        Ok(stored)
    }

    fn store_message(
        &self,
        envelope: &Event,
        conversation: &ConversationId,
        from: &UserId,
        timestamp: &str,
        content: MessageContent,
    ) -> CoreResult<bool> {
        self.ctx
            .storage
            .messages
            .insert_message(Message {
                id: envelope.id.as_str().to_string(),
                conversation: conversation.clone(),
                sender: from.clone(),
                date: message_date(timestamp),
                content,
            })
            .wrap_storage()
    }

    /// Decrypts a Proteus message and stores the result.
    pub fn decrypt_proteus(
        &self,
        envelope: &Event,
        conversation: &ConversationId,
        from: &UserId,
        sender_client: &ClientId,
        content: &str,
        timestamp: &str,
    ) -> CoreResult<()> {
        if self.already_stored(envelope, conversation)? {
            return Ok(());
        }
        let decrypted = match self.held(envelope) {
            Some(Decrypted::Proteus(plaintext)) => Ok(plaintext),
            _ => self
                .crypto
                .proteus
                .decrypt(from, sender_client, content)
                .wrap_proteus(),
        };
        match decrypted {
            Ok(plaintext) => {
                self.hold(envelope, Decrypted::Proteus(plaintext.clone()));
                self.store_message(
                    envelope,
                    conversation,
                    from,
                    timestamp,
                    MessageContent::Text(plaintext),
                )?;
                self.release(envelope);
                self.ctx.logger.success(envelope, "proteus");
                Ok(())
            }
            Err(CoreFailure::Proteus(failure))
                if failure.code == ProteusErrorCode::DuplicateMessage =>
            {
                self.ctx.logger.skipped(envelope, "duplicate proteus message");
                Ok(())
            }
            Err(CoreFailure::Proteus(failure)) => {
                self.store_message(
                    envelope,
                    conversation,
                    from,
                    timestamp,
                    MessageContent::FailedDecryption {
                        sender_client: Some(sender_client.clone()),
                        reason: format!("{:?}", failure.code),
                    },
                )?;
                self.ctx.logger.failure(
                    envelope,
                    &CoreFailure::Proteus(failure),
                    "stored failed decryption",
                );
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Decrypts an MLS message, advancing the group epoch on commits.
    pub fn decrypt_mls(
        &self,
        envelope: &Event,
        conversation: &ConversationId,
        from: &UserId,
        sub_conversation: Option<&str>,
        content: &str,
        timestamp: &str,
    ) -> CoreResult<()> {
        if sub_conversation.is_some() {
            self.ctx.logger.skipped(envelope, "subconversation message");
            return Ok(());
        }
        let Some(stored) = self
            .ctx
            .storage
            .conversations
            .get_conversation(conversation)
            .wrap_storage()?
        else {
            self.ctx.logger.skipped(envelope, "conversation not stored");
            return Ok(());
        };
        let Some(group_id) = stored.protocol.group_id() else {
            self.ctx.logger.skipped(envelope, "conversation has no mls group");
            return Ok(());
        };

        if self.already_stored(envelope, conversation)? {
            return Ok(());
        }

        let decrypted = match self.held(envelope) {
            Some(Decrypted::Mls(decrypted)) => Ok(decrypted),
            _ => self
                .crypto
                .mls
                .decrypt_message(group_id, content)
                .wrap_mls(),
        };
        match decrypted {
            Ok(decrypted) => {
                self.hold(envelope, Decrypted::Mls(decrypted.clone()));
                let epoch = decrypted.epoch;
                self.ctx
                    .storage
                    .conversations
                    .update_conversation(conversation, &mut |c| {
                        let state = c.protocol.group_state().unwrap_or(GroupState::Established);
                        c.protocol.set_group(epoch, state);
                    })
                    .wrap_storage()?;
                match decrypted.plaintext {
                    Some(plaintext) => {
                        self.store_message(
                            envelope,
                            conversation,
                            from,
                            timestamp,
                            MessageContent::Text(plaintext),
                        )?;
                        self.ctx.logger.success(envelope, "mls application message");
                    }
                    None => self
                        .ctx
                        .logger
                        .success(envelope, &format!("mls handshake epoch={epoch}")),
                }
                self.release(envelope);
                Ok(())
            }
            Err(CoreFailure::Mls(failure)) => match resolve_mls_failure(&failure) {
                MlsFailureResolution::Ignore => {
                    self.ctx.logger.skipped(envelope, &failure.to_string());
                    Ok(())
                }
                MlsFailureResolution::OutOfSync => {
                    self.ctx
                        .storage
                        .conversations
                        .update_conversation(conversation, &mut |c| {
                            c.protocol.set_group_state(GroupState::OutOfSync);
                        })
                        .wrap_storage()?;
                    self.ctx.logger.failure(
                        envelope,
                        &CoreFailure::Mls(failure),
                        "group marked out of sync",
                    );
                    Ok(())
                }
                MlsFailureResolution::InformUser => {
                    self.store_message(
                        envelope,
                        conversation,
                        from,
                        timestamp,
                        MessageContent::FailedDecryption {
                            sender_client: None,
                            reason: failure.to_string(),
                        },
                    )?;
                    self.ctx.logger.failure(
                        envelope,
                        &CoreFailure::Mls(failure),
                        "stored failed decryption",
                    );
                    Ok(())
                }
            },
            Err(other) => Err(other),
        }
    }

    /// Joins the group of a welcome and marks it established.
    pub async fn process_welcome(
        &self,
        envelope: &Event,
        conversation: &ConversationId,
        welcome: &str,
    ) -> CoreResult<()> {
        let joined = match self.crypto.mls.process_welcome(welcome).wrap_mls() {
            Ok(joined) => joined,
            Err(CoreFailure::Mls(
                failure @ (MlsFailure::OrphanWelcome | MlsFailure::ConversationAlreadyExists),
            )) => {
                self.ctx.logger.skipped(envelope, &failure.to_string());
                return Ok(());
            }
            Err(other) => return Err(other),
        };

        let store = &self.ctx.storage.conversations;
        if store.get_conversation(conversation).wrap_storage()?.is_none() {
            let snapshot = self
                .ctx
                .backend
                .fetch_conversation(conversation)
                .await
                .wrap_api()?;
            store
                .upsert_conversation(Conversation::from_snapshot(&snapshot, None))
                .wrap_storage()?;
        }

        store
            .update_conversation(conversation, &mut |c| {
                let group_id = joined.group_id.clone();
                let epoch = joined.epoch;
                let group_state = GroupState::Established;
                c.protocol = match c.protocol {
                    ProtocolState::Mixed { .. } => ProtocolState::Mixed {
                        group_id,
                        epoch,
                        group_state,
                    },
                    _ => ProtocolState::Mls {
                        group_id,
                        epoch,
                        group_state,
                    },
                };
            })
            .wrap_storage()?;
        self.ctx
            .logger
            .success(envelope, &format!("joined epoch={}", joined.epoch));
        Ok(())
    }
}
