//! Identifier types shared by every msgsync crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading characters kept when an identifier is obfuscated for logs.
const OBFUSCATE_KEEP: usize = 7;

/// Shortens a sensitive identifier so it can be written to logs.
///
/// ```
/// use msgsync_protocol::obfuscate;
///
/// assert_eq!(obfuscate("2f8a9c10-aaaa"), "2f8a9c1***");
/// assert_eq!(obfuscate("abc"), "abc***");
/// ```
#[must_use]
pub fn obfuscate(value: &str) -> String {
    let kept: String = value.chars().take(OBFUSCATE_KEEP).collect();
    format!("{kept}***")
}

/// An identifier scoped to the backend domain that owns it.
///
/// Users and conversations are both addressed this way; two ids are equal
/// only if value and domain match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedId {
    /// Domain-local identifier.
    #[serde(rename = "id")]
    pub value: String,
    /// Owning backend domain.
    pub domain: String,
}

impl QualifiedId {
    /// Creates a new qualified id.
    pub fn new(value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            domain: domain.into(),
        }
    }

    /// Parses `value@domain`. Returns `None` when either half is empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let (value, domain) = raw.rsplit_once('@')?;
        if value.is_empty() || domain.is_empty() {
            return None;
        }
        Some(Self::new(value, domain))
    }

    /// Returns true if this id belongs to `domain`.
    #[must_use]
    pub fn is_on(&self, domain: &str) -> bool {
        self.domain == domain
    }

    /// Returns a log-safe rendering of this id.
    #[must_use]
    pub fn obfuscated(&self) -> String {
        format!("{}@{}", obfuscate(&self.value), self.domain)
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, self.domain)
    }
}

/// Identifier of a user.
pub type UserId = QualifiedId;

/// Identifier of a conversation.
pub type ConversationId = QualifiedId;

/// Identifier of one device of a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// Creates a new client id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a team.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl TeamId {
    /// Creates a new team id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned event identifier.
///
/// Event ids are ordered lexically; the backend assigns them so that
/// lexical order matches delivery order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Creates a new event id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a log-safe rendering of this id.
    #[must_use]
    pub fn obfuscated(&self) -> String {
        obfuscate(&self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_id_display_and_parse() {
        let id = QualifiedId::new("alice", "wire.com");
        assert_eq!(id.to_string(), "alice@wire.com");
        assert_eq!(QualifiedId::parse("alice@wire.com"), Some(id));
        assert_eq!(QualifiedId::parse("alice"), None);
        assert_eq!(QualifiedId::parse("@wire.com"), None);
    }

    #[test]
    fn qualified_id_wire_shape() {
        let id = QualifiedId::new("c1", "foo.com");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "c1", "domain": "foo.com" }));
    }

    #[test]
    fn event_ids_order_lexically() {
        let mut ids = vec![EventId::new("0003"), EventId::new("0001"), EventId::new("0002")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "0001");
        assert_eq!(ids[2].as_str(), "0003");
    }

    #[test]
    fn obfuscation_keeps_domain() {
        let id = QualifiedId::new("0123456789", "bar.org");
        assert_eq!(id.obfuscated(), "0123456***@bar.org");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn padded_event_ids_order_like_their_numbers(a in 0u32..1_000_000, b in 0u32..1_000_000) {
                let left = EventId::new(format!("{a:08}"));
                let right = EventId::new(format!("{b:08}"));
                prop_assert_eq!(left.cmp(&right), a.cmp(&b));
            }

            #[test]
            fn qualified_id_parses_its_display(value in "[a-z0-9-]{1,16}", domain in "[a-z]{1,8}\\.(com|org)") {
                let id = QualifiedId::new(value, domain);
                prop_assert_eq!(QualifiedId::parse(&id.to_string()), Some(id));
            }
        }
    }
}
