//! Domain event receivers.
//!
//! One receiver per event category. A receiver applies one event to local
//! storage and reports success or a [`CoreFailure`]; it knows nothing about
//! sync orchestration. Every receiver is idempotent: applying the same event
//! twice leaves the same state as applying it once.
//!
//! Conditions that need no work (an unknown conversation, an ignored
//! feature) are logged as skipped and reported as success.

mod conversation;
mod feature_config;
mod federation;
mod message;
mod missed;
mod team;
mod user;
mod user_property;

pub use conversation::ConversationEventReceiver;
pub use feature_config::{apply_feature_config, FeatureConfigEventReceiver};
pub use federation::{members_to_remove, FederationEventReceiver};
pub use message::{resolve_mls_failure, MessageEventReceiver, MlsFailureResolution};
pub use missed::MissedNotificationsReceiver;
pub use team::TeamEventReceiver;
pub use user::UserEventReceiver;
pub use user_property::UserPropertyEventReceiver;

use crate::context::AccountContext;
use async_trait::async_trait;
use msgsync_core::boundary::{ApiResultExt, StoreResultExt};
use msgsync_core::{CoreFailure, CoreResult, Message, SystemContent, User};
use msgsync_protocol::{ConversationId, Event, UserId};

/// Applies events of one category.
#[async_trait]
pub trait EventReceiver<E: Sync>: Send + Sync {
    /// Applies `event`, delivered in `envelope`.
    async fn on_event(&self, envelope: &Event, event: &E) -> CoreResult<()>;
}

/// Turns a [`StorageFailure::DataNotFound`](msgsync_core::StorageFailure::DataNotFound)
/// into `Ok(false)`.
pub(crate) trait FoundExt {
    fn found(self) -> CoreResult<bool>;
}

impl FoundExt for CoreResult<()> {
    fn found(self) -> CoreResult<bool> {
        match self {
            Ok(()) => Ok(true),
            Err(failure) if failure.is_data_not_found() => Ok(false),
            Err(failure) => Err(failure),
        }
    }
}

/// Id of the system message an event produces in `conversation`.
///
/// Derived from the event so a replay hits the stored copy.
pub(crate) fn system_message_id(envelope: &Event, conversation: &ConversationId) -> String {
    format!("{}:{}", envelope.id.as_str(), conversation)
}

/// Message date: the event timestamp when it has one, else now.
pub(crate) fn message_date(timestamp: &str) -> String {
    if timestamp.is_empty() {
        chrono::Utc::now().to_rfc3339()
    } else {
        timestamp.to_string()
    }
}

/// Builds the system message an event produces in `conversation`.
pub(crate) fn system_message(
    envelope: &Event,
    conversation: &ConversationId,
    sender: &UserId,
    timestamp: &str,
    content: SystemContent,
) -> Message {
    Message::system(
        system_message_id(envelope, conversation),
        conversation.clone(),
        sender.clone(),
        message_date(timestamp),
        content,
    )
}

/// Fetches and stores the profiles of `ids` that are not stored yet.
///
/// Transient backend failures propagate so the event is retried. Other
/// backend failures (unreachable domains, rejected requests) leave the
/// profiles missing until the next slow sync.
pub(crate) async fn fetch_unknown_users(ctx: &AccountContext, ids: &[UserId]) -> CoreResult<usize> {
    let mut unknown: Vec<UserId> = Vec::new();
    for id in ids {
        if !unknown.contains(id) && ctx.storage.users.get_user(id).wrap_storage()?.is_none() {
            unknown.push(id.clone());
        }
    }
    if unknown.is_empty() {
        return Ok(0);
    }

    let profiles = match ctx.backend.fetch_users(&unknown).await.wrap_api() {
        Ok(profiles) => profiles,
        Err(failure) if failure.is_transient() => return Err(failure),
        Err(failure) => {
            tracing::warn!(
                account = %ctx.logger.account(),
                missing = unknown.len(),
                error = %failure,
                "member profiles unavailable"
            );
            return Ok(0);
        }
    };
    for profile in &profiles {
        ctx.storage
            .users
            .upsert_user(User::from_profile(profile, None))
            .wrap_storage()?;
    }
    Ok(profiles.len())
}

/// Keeps the first failure seen.
pub(crate) fn first_failure(slot: &mut Option<CoreFailure>, failure: CoreFailure) {
    if slot.is_none() {
        *slot = Some(failure);
    }
}
