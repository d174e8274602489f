//! Feature configuration receiver.

use super::EventReceiver;
use crate::context::AccountContext;
use async_trait::async_trait;
use msgsync_core::boundary::StoreResultExt;
use msgsync_core::{CoreResult, E2eiSettings, UserConfig};
use msgsync_protocol::{Event, FeatureConfigEvent};

/// Applies one feature update to `config`.
///
/// Returns false for features this client does not track. Used by both the
/// receiver and slow sync.
pub fn apply_feature_config(config: &mut UserConfig, event: &FeatureConfigEvent) -> bool {
    match event {
        FeatureConfigEvent::FileSharingUpdated { status } => {
            config.file_sharing_enabled = status.is_enabled();
        }
        FeatureConfigEvent::MlsUpdated {
            status,
            default_protocol,
            supported_protocols,
        } => {
            config.mls_enabled = status.is_enabled();
            config.default_protocol = Some(*default_protocol);
            config.supported_protocols = supported_protocols.clone();
        }
        FeatureConfigEvent::ClassifiedDomainsUpdated { status, domains } => {
            config.classified_domains = status.is_enabled().then(|| domains.clone());
        }
        FeatureConfigEvent::ConferenceCallingUpdated { status } => {
            config.conference_calling_enabled = status.is_enabled();
        }
        FeatureConfigEvent::GuestRoomLinkUpdated { status } => {
            config.guest_links_enabled = status.is_enabled();
        }
        FeatureConfigEvent::SelfDeletingMessagesUpdated {
            status,
            enforced_timeout_secs,
        } => {
            config.self_deleting_enabled = status.is_enabled();
            config.enforced_self_deleting_secs =
                (status.is_enabled() && *enforced_timeout_secs > 0).then_some(*enforced_timeout_secs);
        }
        FeatureConfigEvent::MlsE2eiUpdated {
            status,
            verification_expiration_secs,
            acme_discovery_url,
        } => {
            config.e2ei = Some(E2eiSettings {
                enabled: status.is_enabled(),
                verification_expiration_secs: *verification_expiration_secs,
                discovery_url: acme_discovery_url.clone(),
            });
        }
        FeatureConfigEvent::Unknown { .. } => return false,
    }
    true
}

/// Applies feature configuration updates.
#[derive(Debug, Clone)]
pub struct FeatureConfigEventReceiver {
    ctx: AccountContext,
}

impl FeatureConfigEventReceiver {
    /// Creates a receiver.
    pub fn new(ctx: AccountContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl EventReceiver<FeatureConfigEvent> for FeatureConfigEventReceiver {
    async fn on_event(&self, envelope: &Event, event: &FeatureConfigEvent) -> CoreResult<()> {
        if let FeatureConfigEvent::Unknown { name } = event {
            self.ctx
                .logger
                .skipped(envelope, &format!("unknown feature {name}"));
            return Ok(());
        }
        self.ctx
            .storage
            .config
            .update_user_config(&mut |config| {
                apply_feature_config(config, event);
            })
            .wrap_storage()?;
        self.ctx.logger.success(envelope, "");
        Ok(())
    }
}
