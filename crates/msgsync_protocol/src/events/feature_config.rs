//! Feature configuration events.
//!
//! The backend sends every feature under one event type and names the feature
//! in a `name` field. Names this client does not know decode to
//! [`FeatureConfigEvent::Unknown`] so the receiver can filter them out.

use crate::model::{FeatureStatus, Protocol};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const FEATURE_CONFIG_UPDATE: &str = "feature-config.update";

/// A feature configuration update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFeatureUpdate", into = "RawFeatureUpdate")]
pub enum FeatureConfigEvent {
    /// File sharing toggled.
    FileSharingUpdated {
        /// New status.
        status: FeatureStatus,
    },
    /// MLS availability or default protocol changed.
    MlsUpdated {
        /// New status.
        status: FeatureStatus,
        /// Protocol for new conversations.
        default_protocol: Protocol,
        /// Protocols clients may use.
        supported_protocols: Vec<Protocol>,
    },
    /// Classified domains list changed.
    ClassifiedDomainsUpdated {
        /// New status.
        status: FeatureStatus,
        /// Domains considered classified.
        domains: Vec<String>,
    },
    /// Conference calling toggled.
    ConferenceCallingUpdated {
        /// New status.
        status: FeatureStatus,
    },
    /// Guest links toggled.
    GuestRoomLinkUpdated {
        /// New status.
        status: FeatureStatus,
    },
    /// Team-wide self-deleting message policy changed.
    SelfDeletingMessagesUpdated {
        /// New status.
        status: FeatureStatus,
        /// Enforced timeout in seconds; zero means not enforced.
        enforced_timeout_secs: u64,
    },
    /// End-to-end identity settings changed.
    MlsE2eiUpdated {
        /// New status.
        status: FeatureStatus,
        /// Grace period for certificate enrollment, in seconds.
        verification_expiration_secs: u64,
        /// ACME discovery endpoint.
        acme_discovery_url: Option<String>,
    },
    /// A feature this client does not handle.
    Unknown {
        /// Feature name as sent by the backend.
        name: String,
    },
}

impl FeatureConfigEvent {
    /// Returns a stable name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureConfigEvent::FileSharingUpdated { .. } => "FeatureConfig.FileSharingUpdated",
            FeatureConfigEvent::MlsUpdated { .. } => "FeatureConfig.MLSUpdated",
            FeatureConfigEvent::ClassifiedDomainsUpdated { .. } => {
                "FeatureConfig.ClassifiedDomainsUpdated"
            }
            FeatureConfigEvent::ConferenceCallingUpdated { .. } => {
                "FeatureConfig.ConferenceCallingUpdated"
            }
            FeatureConfigEvent::GuestRoomLinkUpdated { .. } => "FeatureConfig.GuestRoomLinkUpdated",
            FeatureConfigEvent::SelfDeletingMessagesUpdated { .. } => {
                "FeatureConfig.SelfDeletingMessagesUpdated"
            }
            FeatureConfigEvent::MlsE2eiUpdated { .. } => "FeatureConfig.MLSE2EIUpdated",
            FeatureConfigEvent::Unknown { .. } => "FeatureConfig.Unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFeatureUpdate {
    #[serde(rename = "type", default = "feature_config_type")]
    kind: String,
    name: String,
    #[serde(default)]
    data: RawFeatureData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawFeatureData {
    #[serde(default)]
    status: FeatureStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    config: Value,
}

fn feature_config_type() -> String {
    FEATURE_CONFIG_UPDATE.to_string()
}

#[derive(Deserialize)]
struct MlsConfig {
    default_protocol: Protocol,
    #[serde(default)]
    supported_protocols: Vec<Protocol>,
}

#[derive(Deserialize)]
struct ClassifiedDomainsConfig {
    #[serde(default)]
    domains: Vec<String>,
}

#[derive(Deserialize)]
struct SelfDeletingConfig {
    #[serde(default)]
    enforced_timeout_seconds: u64,
}

#[derive(Deserialize)]
struct E2eiConfig {
    #[serde(default)]
    verification_expiration: u64,
    #[serde(default)]
    acme_discovery_url: Option<String>,
}

impl TryFrom<RawFeatureUpdate> for FeatureConfigEvent {
    type Error = serde_json::Error;

    fn try_from(raw: RawFeatureUpdate) -> Result<Self, Self::Error> {
        let status = raw.data.status;
        let config = raw.data.config;
        Ok(match raw.name.as_str() {
            "fileSharing" => FeatureConfigEvent::FileSharingUpdated { status },
            "mls" => {
                let config: MlsConfig = serde_json::from_value(config)?;
                FeatureConfigEvent::MlsUpdated {
                    status,
                    default_protocol: config.default_protocol,
                    supported_protocols: config.supported_protocols,
                }
            }
            "classifiedDomains" => {
                let config: ClassifiedDomainsConfig = serde_json::from_value(config)?;
                FeatureConfigEvent::ClassifiedDomainsUpdated {
                    status,
                    domains: config.domains,
                }
            }
            "conferenceCalling" => FeatureConfigEvent::ConferenceCallingUpdated { status },
            "conversationGuestLinks" => FeatureConfigEvent::GuestRoomLinkUpdated { status },
            "selfDeletingMessages" => {
                let config: SelfDeletingConfig = serde_json::from_value(config)?;
                FeatureConfigEvent::SelfDeletingMessagesUpdated {
                    status,
                    enforced_timeout_secs: config.enforced_timeout_seconds,
                }
            }
            "mlsE2EId" => {
                let config: E2eiConfig = serde_json::from_value(config)?;
                FeatureConfigEvent::MlsE2eiUpdated {
                    status,
                    verification_expiration_secs: config.verification_expiration,
                    acme_discovery_url: config.acme_discovery_url,
                }
            }
            _ => FeatureConfigEvent::Unknown { name: raw.name },
        })
    }
}

impl From<FeatureConfigEvent> for RawFeatureUpdate {
    fn from(event: FeatureConfigEvent) -> Self {
        let (name, status, config) = match event {
            FeatureConfigEvent::FileSharingUpdated { status } => ("fileSharing", status, Value::Null),
            FeatureConfigEvent::MlsUpdated {
                status,
                default_protocol,
                supported_protocols,
            } => (
                "mls",
                status,
                serde_json::json!({
                    "default_protocol": default_protocol,
                    "supported_protocols": supported_protocols,
                }),
            ),
            FeatureConfigEvent::ClassifiedDomainsUpdated { status, domains } => (
                "classifiedDomains",
                status,
                serde_json::json!({ "domains": domains }),
            ),
            FeatureConfigEvent::ConferenceCallingUpdated { status } => {
                ("conferenceCalling", status, Value::Null)
            }
            FeatureConfigEvent::GuestRoomLinkUpdated { status } => {
                ("conversationGuestLinks", status, Value::Null)
            }
            FeatureConfigEvent::SelfDeletingMessagesUpdated {
                status,
                enforced_timeout_secs,
            } => (
                "selfDeletingMessages",
                status,
                serde_json::json!({ "enforced_timeout_seconds": enforced_timeout_secs }),
            ),
            FeatureConfigEvent::MlsE2eiUpdated {
                status,
                verification_expiration_secs,
                acme_discovery_url,
            } => (
                "mlsE2EId",
                status,
                serde_json::json!({
                    "verification_expiration": verification_expiration_secs,
                    "acme_discovery_url": acme_discovery_url,
                }),
            ),
            FeatureConfigEvent::Unknown { name } => {
                return RawFeatureUpdate {
                    kind: feature_config_type(),
                    name,
                    data: RawFeatureData::default(),
                }
            }
        };
        RawFeatureUpdate {
            kind: feature_config_type(),
            name: name.to_string(),
            data: RawFeatureData { status, config },
        }
    }
}
