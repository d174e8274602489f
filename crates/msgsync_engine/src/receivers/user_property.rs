//! User property receiver.

use super::EventReceiver;
use crate::context::AccountContext;
use async_trait::async_trait;
use msgsync_core::boundary::StoreResultExt;
use msgsync_core::CoreResult;
use msgsync_protocol::{Event, UserPropertyEvent};

/// Applies synchronized account properties.
#[derive(Debug, Clone)]
pub struct UserPropertyEventReceiver {
    ctx: AccountContext,
}

impl UserPropertyEventReceiver {
    /// Creates a receiver.
    pub fn new(ctx: AccountContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl EventReceiver<UserPropertyEvent> for UserPropertyEventReceiver {
    async fn on_event(&self, envelope: &Event, event: &UserPropertyEvent) -> CoreResult<()> {
        let config = &self.ctx.storage.config;
        match event {
            UserPropertyEvent::ReadReceiptModeSet { enabled } => config
                .update_user_config(&mut |c| c.read_receipts_enabled = *enabled)
                .wrap_storage()?,
            UserPropertyEvent::TypingIndicatorModeSet { enabled } => config
                .update_user_config(&mut |c| c.typing_indicator_enabled = *enabled)
                .wrap_storage()?,
            UserPropertyEvent::Unknown { key } => {
                self.ctx
                    .logger
                    .skipped(envelope, &format!("unknown property {key}"));
                return Ok(());
            }
        }
        self.ctx.logger.success(envelope, "");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::testing::harness;
    use msgsync_protocol::DomainEvent;

    #[tokio::test]
    async fn properties_toggle_config() {
        let h = harness();
        let receiver = UserPropertyEventReceiver::new(h.ctx.clone());
        for event in [
            UserPropertyEvent::ReadReceiptModeSet { enabled: true },
            UserPropertyEvent::TypingIndicatorModeSet { enabled: true },
            UserPropertyEvent::Unknown {
                key: "webapp".into(),
            },
        ] {
            let envelope = Event::new("0001", DomainEvent::UserProperty(event.clone()));
            receiver.on_event(&envelope, &event).await.unwrap();
        }
        let config = h.ctx.storage.config.user_config().unwrap();
        assert!(config.read_receipts_enabled);
        assert!(config.typing_indicator_enabled);
    }
}
