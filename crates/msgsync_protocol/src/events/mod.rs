//! Domain events.
//!
//! Every payload decodes into exactly one [`DomainEvent`] variant. The
//! `type` field selects the category, and the category enum selects the
//! variant. Decoding never fails: anything that cannot be read becomes
//! [`DomainEvent::Unknown`] carrying the reason.

mod conversation;
mod feature_config;
mod federation;
mod team;
mod user;
mod user_property;

pub use conversation::{ConversationEvent, MemberChange, MemberLeaveReason};
pub use feature_config::FeatureConfigEvent;
pub use federation::FederationEvent;
pub use team::TeamEvent;
pub use user::UserEvent;
pub use user_property::UserPropertyEvent;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Wire type of the missed-notifications signal.
pub const MISSED_NOTIFICATIONS_TYPE: &str = "notifications.missed";

/// A payload that could not be mapped to a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEvent {
    /// The `type` field, if the payload had one.
    pub kind: Option<String>,
    /// Why decoding fell back to this placeholder.
    pub reason: String,
}

/// A decoded event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// Conversation, membership and message events.
    Conversation(ConversationEvent),
    /// User, device and connection events.
    User(UserEvent),
    /// Team events.
    Team(TeamEvent),
    /// Federation stop events.
    Federation(FederationEvent),
    /// Feature configuration updates.
    FeatureConfig(FeatureConfigEvent),
    /// Synchronized user properties.
    UserProperty(UserPropertyEvent),
    /// The backend dropped notifications for this client; local state has a gap.
    MissedNotifications,
    /// Placeholder for anything that could not be decoded.
    Unknown(UnknownEvent),
}

impl DomainEvent {
    /// Decodes a JSON payload.
    #[must_use]
    pub fn decode(value: Value) -> Self {
        let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return DomainEvent::Unknown(UnknownEvent {
                kind: None,
                reason: "payload has no type".to_string(),
            });
        };

        let decoded = if kind == MISSED_NOTIFICATIONS_TYPE {
            Ok(DomainEvent::MissedNotifications)
        } else if kind.starts_with("user.properties-") {
            serde_json::from_value(value).map(DomainEvent::UserProperty)
        } else if kind.starts_with("conversation.") {
            serde_json::from_value(value).map(DomainEvent::Conversation)
        } else if kind.starts_with("user.") {
            serde_json::from_value(value).map(DomainEvent::User)
        } else if kind.starts_with("team.") {
            serde_json::from_value(value).map(DomainEvent::Team)
        } else if kind.starts_with("federation.") {
            serde_json::from_value(value).map(DomainEvent::Federation)
        } else if kind.starts_with("feature-config.") {
            serde_json::from_value(value).map(DomainEvent::FeatureConfig)
        } else {
            return DomainEvent::Unknown(UnknownEvent {
                kind: Some(kind),
                reason: "unsupported event type".to_string(),
            });
        };

        decoded.unwrap_or_else(|err| {
            DomainEvent::Unknown(UnknownEvent {
                kind: Some(kind),
                reason: err.to_string(),
            })
        })
    }

    /// Decodes a JSON payload from text.
    #[must_use]
    pub fn decode_str(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => Self::decode(value),
            Err(err) => DomainEvent::Unknown(UnknownEvent {
                kind: None,
                reason: err.to_string(),
            }),
        }
    }

    /// Encodes this payload back to its JSON form.
    ///
    /// Unknown payloads only keep their `type`.
    #[must_use]
    pub fn encode(&self) -> Value {
        let encoded = match self {
            DomainEvent::Conversation(event) => serde_json::to_value(event),
            DomainEvent::User(event) => serde_json::to_value(event),
            DomainEvent::Team(event) => serde_json::to_value(event),
            DomainEvent::Federation(event) => serde_json::to_value(event),
            DomainEvent::FeatureConfig(event) => serde_json::to_value(event),
            DomainEvent::UserProperty(event) => serde_json::to_value(event),
            DomainEvent::MissedNotifications => {
                Ok(serde_json::json!({ "type": MISSED_NOTIFICATIONS_TYPE }))
            }
            DomainEvent::Unknown(unknown) => Ok(match &unknown.kind {
                Some(kind) => serde_json::json!({ "type": kind }),
                None => serde_json::json!({}),
            }),
        };
        encoded.unwrap_or_default()
    }

    /// Returns a stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::Conversation(event) => event.kind(),
            DomainEvent::User(event) => event.kind(),
            DomainEvent::Team(event) => event.kind(),
            DomainEvent::Federation(event) => event.kind(),
            DomainEvent::FeatureConfig(event) => event.kind(),
            DomainEvent::UserProperty(event) => event.kind(),
            DomainEvent::MissedNotifications => "MissedNotifications",
            DomainEvent::Unknown(_) => "Unknown",
        }
    }
}

impl Serialize for DomainEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DomainEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QualifiedId;
    use serde_json::json;

    #[test]
    fn decodes_federation_delete() {
        let event = DomainEvent::decode(json!({ "type": "federation.delete", "domain": "foo.com" }));
        assert_eq!(
            event,
            DomainEvent::Federation(FederationEvent::Delete {
                domain: "foo.com".into()
            })
        );
        assert_eq!(event.kind(), "Federation.Delete");
    }

    #[test]
    fn decodes_member_join() {
        let event = DomainEvent::decode(json!({
            "type": "conversation.member-join",
            "conversation": { "id": "c1", "domain": "wire.com" },
            "from": { "id": "alice", "domain": "wire.com" },
            "members": [{ "id": { "id": "bob", "domain": "foo.com" }, "role": "wire_member" }]
        }));
        let DomainEvent::Conversation(conversation) = event else {
            panic!("expected a conversation event, got {event:?}");
        };
        assert_eq!(conversation.conversation_id(), &QualifiedId::new("c1", "wire.com"));
    }

    #[test]
    fn user_properties_are_not_user_events() {
        let event = DomainEvent::decode(json!({
            "type": "user.properties-set",
            "key": "WIRE_RECEIPT_MODE",
            "value": 0
        }));
        assert!(matches!(event, DomainEvent::UserProperty(_)));
    }

    #[test]
    fn missed_notifications_signal() {
        let event = DomainEvent::decode(json!({ "type": "notifications.missed" }));
        assert_eq!(event, DomainEvent::MissedNotifications);
    }

    #[test]
    fn unknown_type_becomes_placeholder() {
        let event = DomainEvent::decode(json!({ "type": "conversation.poll-created" }));
        let DomainEvent::Unknown(unknown) = event else {
            panic!("expected placeholder");
        };
        assert_eq!(unknown.kind.as_deref(), Some("conversation.poll-created"));
    }

    #[test]
    fn unsupported_category_becomes_placeholder() {
        let event = DomainEvent::decode(json!({ "type": "calling.started" }));
        assert!(matches!(event, DomainEvent::Unknown(_)));
    }

    #[test]
    fn missing_fields_become_placeholder() {
        let event = DomainEvent::decode(json!({ "type": "federation.delete" }));
        let DomainEvent::Unknown(unknown) = event else {
            panic!("expected placeholder");
        };
        assert!(unknown.reason.contains("domain"));
    }

    #[test]
    fn missing_type_and_bad_json() {
        assert!(matches!(
            DomainEvent::decode(json!({ "domain": "foo.com" })),
            DomainEvent::Unknown(UnknownEvent { kind: None, .. })
        ));
        assert!(matches!(
            DomainEvent::decode_str("{not json"),
            DomainEvent::Unknown(UnknownEvent { kind: None, .. })
        ));
    }

    #[test]
    fn encode_then_decode_keeps_variant() {
        let event = DomainEvent::Federation(FederationEvent::ConnectionRemoved {
            domains: vec!["a.com".into(), "b.com".into()],
        });
        assert_eq!(DomainEvent::decode(event.encode()), event);
    }
}
