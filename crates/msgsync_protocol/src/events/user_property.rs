//! User property events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const PROPERTIES_SET: &str = "user.properties-set";
const READ_RECEIPTS_KEY: &str = "WIRE_RECEIPT_MODE";
const TYPING_INDICATOR_KEY: &str = "WIRE_TYPING_INDICATOR_MODE";

/// A user property synchronized across the self user's devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPropertySet", into = "RawPropertySet")]
pub enum UserPropertyEvent {
    /// Read receipts toggled.
    ReadReceiptModeSet {
        /// New value.
        enabled: bool,
    },
    /// Typing indicator toggled.
    TypingIndicatorModeSet {
        /// New value.
        enabled: bool,
    },
    /// A property key this client does not handle.
    Unknown {
        /// Property key.
        key: String,
    },
}

impl UserPropertyEvent {
    /// Returns a stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            UserPropertyEvent::ReadReceiptModeSet { .. } => "UserProperty.ReadReceiptModeSet",
            UserPropertyEvent::TypingIndicatorModeSet { .. } => {
                "UserProperty.TypingIndicatorModeSet"
            }
            UserPropertyEvent::Unknown { .. } => "UserProperty.Unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPropertySet {
    #[serde(rename = "type", default = "properties_set_type")]
    kind: String,
    key: String,
    #[serde(default)]
    value: Value,
}

fn properties_set_type() -> String {
    PROPERTIES_SET.to_string()
}

fn flag(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Number(number) => Ok(number.as_i64().unwrap_or(0) != 0),
        other => Err(format!("expected a flag, got {other}")),
    }
}

impl TryFrom<RawPropertySet> for UserPropertyEvent {
    type Error = String;

    fn try_from(raw: RawPropertySet) -> Result<Self, Self::Error> {
        Ok(match raw.key.as_str() {
            READ_RECEIPTS_KEY => UserPropertyEvent::ReadReceiptModeSet {
                enabled: flag(&raw.value)?,
            },
            TYPING_INDICATOR_KEY => UserPropertyEvent::TypingIndicatorModeSet {
                enabled: flag(&raw.value)?,
            },
            _ => UserPropertyEvent::Unknown { key: raw.key },
        })
    }
}

impl From<UserPropertyEvent> for RawPropertySet {
    fn from(event: UserPropertyEvent) -> Self {
        let (key, value) = match event {
            UserPropertyEvent::ReadReceiptModeSet { enabled } => {
                (READ_RECEIPTS_KEY.to_string(), Value::from(u8::from(enabled)))
            }
            UserPropertyEvent::TypingIndicatorModeSet { enabled } => {
                (TYPING_INDICATOR_KEY.to_string(), Value::from(u8::from(enabled)))
            }
            UserPropertyEvent::Unknown { key } => (key, Value::Null),
        };
        RawPropertySet {
            kind: properties_set_type(),
            key,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_boolean_flags() {
        let on: UserPropertyEvent = serde_json::from_value(
            json!({ "type": "user.properties-set", "key": "WIRE_RECEIPT_MODE", "value": 1 }),
        )
        .unwrap();
        assert_eq!(on, UserPropertyEvent::ReadReceiptModeSet { enabled: true });

        let off: UserPropertyEvent = serde_json::from_value(json!({
            "type": "user.properties-set",
            "key": "WIRE_TYPING_INDICATOR_MODE",
            "value": false
        }))
        .unwrap();
        assert_eq!(off, UserPropertyEvent::TypingIndicatorModeSet { enabled: false });
    }

    #[test]
    fn malformed_value_is_an_error() {
        let result: Result<UserPropertyEvent, _> = serde_json::from_value(
            json!({ "type": "user.properties-set", "key": "WIRE_RECEIPT_MODE", "value": "yes" }),
        );
        assert!(result.is_err());
    }
}
