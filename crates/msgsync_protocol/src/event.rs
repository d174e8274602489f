//! Event envelope.

use crate::error::{ProtocolError, ProtocolResult};
use crate::events::DomainEvent;
use crate::types::EventId;
use serde::{Deserialize, Serialize};

/// An inbound event as delivered by the transport and kept by the event store.
///
/// `id` is unique; the store treats a second insert with the same id as a
/// no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Server-assigned id.
    pub id: EventId,
    /// Decoded payload.
    pub payload: DomainEvent,
    /// True if delivered over the live channel rather than fetched as backlog.
    #[serde(default)]
    pub live: bool,
    /// True for events that must not move the sync cursor.
    #[serde(default)]
    pub transient: bool,
    /// True once the coordinator has routed the event successfully.
    #[serde(default)]
    pub processed: bool,
}

impl Event {
    /// Creates an unprocessed, non-live, non-transient event.
    pub fn new(id: impl Into<EventId>, payload: DomainEvent) -> Self {
        Self {
            id: id.into(),
            payload,
            live: false,
            transient: false,
            processed: false,
        }
    }

    /// Marks the event as delivered live.
    #[must_use]
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    /// Marks the event as transient.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Reads an envelope from JSON text.
    ///
    /// Only a broken envelope is an error; the payload always decodes.
    pub fn from_json(raw: &str) -> ProtocolResult<Self> {
        let event: Event = serde_json::from_str(raw)?;
        if event.id.as_str().is_empty() {
            return Err(ProtocolError::EmptyId);
        }
        Ok(event)
    }

    /// Reads a JSON array of envelopes.
    pub fn list_from_json(raw: &str) -> ProtocolResult<Vec<Self>> {
        let events: Vec<Event> = serde_json::from_str(raw)?;
        if events.iter().any(|event| event.id.as_str().is_empty()) {
            return Err(ProtocolError::EmptyId);
        }
        Ok(events)
    }

    /// Returns the payload's logging name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FederationEvent;

    #[test]
    fn reads_envelope_with_unknown_payload() {
        let event =
            Event::from_json(r#"{"id":"0001","payload":{"type":"mystery"},"transient":true}"#)
                .unwrap();
        assert_eq!(event.id.as_str(), "0001");
        assert!(event.transient);
        assert!(!event.processed);
        assert!(matches!(event.payload, DomainEvent::Unknown(_)));
    }

    #[test]
    fn rejects_missing_or_empty_id() {
        assert!(Event::from_json(r#"{"payload":{"type":"x"}}"#).is_err());
        assert!(matches!(
            Event::from_json(r#"{"id":"","payload":{"type":"x"}}"#),
            Err(ProtocolError::EmptyId)
        ));
    }

    #[test]
    fn builder_flags() {
        let event = Event::new(
            "0002",
            DomainEvent::Federation(FederationEvent::Delete {
                domain: "foo.com".into(),
            }),
        )
        .live()
        .transient();
        assert!(event.live && event.transient);
        assert_eq!(event.kind(), "Federation.Delete");
    }
}
