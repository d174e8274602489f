//! Missed notifications receiver.

use crate::context::AccountContext;
use msgsync_core::CoreResult;
use msgsync_protocol::Event;

/// Reacts to the backend reporting a gap in this client's notifications.
///
/// Clears the slow sync completion marker, schedules a history-lost message
/// and asks the coordinator for a slow sync.
#[derive(Debug, Clone)]
pub struct MissedNotificationsReceiver {
    ctx: AccountContext,
    history_lost_messages: bool,
}

impl MissedNotificationsReceiver {
    /// Creates a receiver. `history_lost_messages` enables the history-lost message.
    pub fn new(ctx: AccountContext, history_lost_messages: bool) -> Self {
        Self {
            ctx,
            history_lost_messages,
        }
    }

    /// Handles the gap signal.
    pub fn on_missed(&self, envelope: &Event) -> CoreResult<()> {
        self.ctx.metadata.clear_slow_sync_completion()?;
        if self.history_lost_messages {
            self.ctx.metadata.set_history_lost_pending(true)?;
        }
        self.ctx.requests.request_slow_sync();
        self.ctx.logger.success(envelope, "slow sync requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::testing::harness;
    use msgsync_protocol::DomainEvent;

    #[test]
    fn gap_clears_marker_and_requests_slow_sync() {
        let h = harness();
        h.ctx
            .metadata
            .set_slow_sync_completed_at("2024-01-01T00:00:00Z")
            .unwrap();
        let receiver = MissedNotificationsReceiver::new(h.ctx.clone(), true);

        receiver
            .on_missed(&Event::new("0001", DomainEvent::MissedNotifications))
            .unwrap();

        assert_eq!(h.ctx.metadata.slow_sync_completed_at().unwrap(), None);
        assert!(h.ctx.metadata.history_lost_pending().unwrap());
        assert!(h.ctx.requests.is_requested());
    }

    #[test]
    fn history_lost_message_can_be_disabled() {
        let h = harness();
        let receiver = MissedNotificationsReceiver::new(h.ctx.clone(), false);
        receiver
            .on_missed(&Event::new("0001", DomainEvent::MissedNotifications))
            .unwrap();
        assert!(!h.ctx.metadata.history_lost_pending().unwrap());
        assert!(h.ctx.requests.is_requested());
    }
}
