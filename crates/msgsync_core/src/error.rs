//! Failure taxonomy.
//!
//! [`CoreFailure`] is the closed set of failures every layer above the I/O
//! boundaries works with. Raw boundary errors are converted exactly once, at
//! the call site, by the extension traits in [`crate::boundary`]; the raw
//! error stays attached as the source.

use msgsync_protocol::UserId;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Original error kept for diagnostics.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreFailure>;

/// Backend label reported when a user has not consented to legal hold.
pub const MISSING_LEGAL_HOLD_CONSENT_LABEL: &str = "missing-legalhold-consent";

/// Root failure type.
#[derive(Debug, Clone, Error)]
pub enum CoreFailure {
    /// Talking to the backend failed.
    #[error(transparent)]
    Network(#[from] NetworkFailure),

    /// The local store failed.
    #[error(transparent)]
    Storage(#[from] StorageFailure),

    /// An MLS operation failed.
    #[error(transparent)]
    Mls(#[from] MlsFailure),

    /// A Proteus operation failed.
    #[error(transparent)]
    Proteus(#[from] ProteusFailure),

    /// An end-to-end identity operation failed.
    #[error(transparent)]
    E2ei(#[from] E2eiFailure),

    /// A feature-level precondition does not hold.
    #[error(transparent)]
    Feature(#[from] FeatureFailure),

    /// Anything that could not be classified.
    #[error("unknown failure")]
    Unknown {
        /// Original error.
        #[source]
        cause: Option<Cause>,
    },
}

/// Failures talking to the backend.
#[derive(Debug, Clone, Error)]
pub enum NetworkFailure {
    /// The device is offline.
    #[error("no network connection")]
    NoNetworkConnection {
        /// Original error.
        #[source]
        cause: Option<Cause>,
    },

    /// The configured proxy rejected or dropped the request.
    #[error("proxy error")]
    ProxyError {
        /// Original error.
        #[source]
        cause: Option<Cause>,
    },

    /// The backend answered with something unexpected.
    #[error("server miscommunication")]
    ServerMiscommunication {
        /// Backend answer.
        #[source]
        error: ServerError,
    },

    /// A federated backend could not serve the request.
    #[error(transparent)]
    FederatedBackend(#[from] FederatedBackendFailure),

    /// The backend does not implement the requested API version.
    #[error("feature not supported by the backend")]
    FeatureNotSupported,
}

/// Error answer from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status} {label}: {message}")]
pub struct ServerError {
    /// HTTP status, or 0 when the answer could not be read at all.
    pub status: u16,
    /// Machine-readable label.
    pub label: String,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Creates a server error.
    pub fn new(status: u16, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            label: label.into(),
            message: message.into(),
        }
    }

    /// Returns true for 4xx answers.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Returns true for 5xx answers.
    #[must_use]
    pub fn is_server_side(&self) -> bool {
        self.status >= 500
    }
}

/// Failures caused by another backend in the federation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FederatedBackendFailure {
    /// Generic federation error.
    #[error("federation failure: {label}")]
    General {
        /// Backend label.
        label: String,
    },

    /// The remote backend refused to federate.
    #[error("federation denied: {label}")]
    FederationDenied {
        /// Backend label.
        label: String,
    },

    /// Federation is disabled on the self backend.
    #[error("federation not enabled: {label}")]
    FederationNotEnabled {
        /// Backend label.
        label: String,
    },

    /// The involved backends do not all federate with each other.
    #[error("conflicting backends: {domains:?}")]
    ConflictingBackends {
        /// Backends that do not federate.
        domains: Vec<String>,
    },

    /// Some backends could not be reached.
    #[error("unreachable backends: {domains:?}")]
    FailedDomains {
        /// Unreachable backends.
        domains: Vec<String>,
    },
}

impl FederatedBackendFailure {
    /// Returns true for the sub-variants that may succeed when retried later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FederatedBackendFailure::ConflictingBackends { .. }
                | FederatedBackendFailure::FailedDomains { .. }
        )
    }
}

/// Failures of the local store.
#[derive(Debug, Clone, Error)]
pub enum StorageFailure {
    /// An expected row is absent.
    #[error("data not found")]
    DataNotFound,

    /// Any other storage error.
    #[error("storage failure")]
    Generic {
        /// Original error.
        #[source]
        cause: Cause,
    },
}

/// Failures reported by the MLS layer.
#[derive(Debug, Clone, Error)]
pub enum MlsFailure {
    /// Message targets a different epoch than the local group.
    #[error("wrong epoch")]
    WrongEpoch,
    /// Message was already decrypted.
    #[error("duplicate message")]
    DuplicateMessage,
    /// Message targets a future epoch and was buffered.
    #[error("buffered future message")]
    BufferedFutureMessage,
    /// Commit authored by this device; already applied.
    #[error("self commit ignored")]
    SelfCommitIgnored,
    /// Group exists but its creation was not merged.
    #[error("unmerged pending group")]
    UnmergedPendingGroup,
    /// Group already exists locally.
    #[error("conversation already exists")]
    ConversationAlreadyExists,
    /// Epoch is too old to decrypt.
    #[error("message epoch too old")]
    MessageEpochTooOld,
    /// Conversation is not an MLS conversation.
    #[error("conversation does not support MLS")]
    ConversationDoesNotSupportMls,
    /// Proposal is no longer valid.
    #[error("stale proposal")]
    StaleProposal,
    /// Commit is no longer valid.
    #[error("stale commit")]
    StaleCommit,
    /// Commit references a proposal this device never saw.
    #[error("commit for missing proposal")]
    CommitForMissingProposal,
    /// Group is unknown to the MLS layer.
    #[error("conversation not found")]
    ConversationNotFound,
    /// Welcome for a key package this device no longer has.
    #[error("orphan welcome")]
    OrphanWelcome,
    /// MLS is disabled for this client.
    #[error("MLS disabled")]
    Disabled,
    /// Internal MLS errors.
    #[error("MLS internal errors")]
    InternalErrors,
    /// Any other MLS error.
    #[error("MLS failure")]
    Generic {
        /// Original error.
        #[source]
        cause: Cause,
    },
}

/// Proteus error codes surfaced by the crypto layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProteusErrorCode {
    /// No session with the sender's device.
    SessionNotFound,
    /// Message was already decrypted.
    DuplicateMessage,
    /// Remote identity changed.
    RemoteIdentityChanged,
    /// Message signature did not verify.
    InvalidSignature,
    /// Message could not be decrypted.
    InvalidMessage,
    /// Message could not be decoded.
    DecodeError,
    /// Referenced prekey does not exist.
    PrekeyNotFound,
    /// Unclassified error.
    Unknown,
}

/// Failure reported by the Proteus layer.
#[derive(Debug, Clone, Error)]
#[error("proteus failure: {code:?}")]
pub struct ProteusFailure {
    /// Error code.
    pub code: ProteusErrorCode,
    /// Original error.
    #[source]
    pub cause: Option<Cause>,
}

/// Failures of end-to-end identity operations.
#[derive(Debug, Clone, Error)]
pub enum E2eiFailure {
    /// E2EI is disabled for the team.
    #[error("end-to-end identity disabled")]
    Disabled,
    /// Team settings lack the ACME discovery URL.
    #[error("missing ACME discovery URL")]
    MissingDiscoveryUrl,
    /// Any other E2EI error.
    #[error("end-to-end identity failure")]
    Generic {
        /// Original error.
        #[source]
        cause: Cause,
    },
}

/// Why no common protocol exists between participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoCommonProtocol {
    /// The self client is behind.
    SelfNeedToUpdate,
    /// Another participant is behind.
    OtherNeedToUpdate,
}

/// Feature-level preconditions that do not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureFailure {
    /// This device has no registered client.
    #[error("missing client registration")]
    MissingClientRegistration,
    /// Some users have no key packages left.
    #[error("missing key packages for {} users", .failed_user_ids.len())]
    MissingKeyPackages {
        /// Users without key packages.
        failed_user_ids: Vec<UserId>,
    },
    /// Participants share no protocol.
    #[error("no common protocol found: {0:?}")]
    NoCommonProtocolFound(NoCommonProtocol),
    /// The sync cursor or the client is unknown to the backend.
    #[error("sync event or client not found")]
    SyncEventOrClientNotFound,
    /// Operation is MLS-only.
    #[error("not supported by proteus")]
    NotSupportedByProteus,
    /// The sender id of an event is not valid.
    #[error("invalid event sender id")]
    InvalidEventSenderId,
    /// Only system messages may be inserted here.
    #[error("only system messages allowed")]
    OnlySystemMessageAllowed,
}

impl CoreFailure {
    /// Wraps an arbitrary error as [`CoreFailure::Unknown`].
    pub fn unknown(cause: impl StdError + Send + Sync + 'static) -> Self {
        CoreFailure::Unknown {
            cause: Some(Arc::new(cause)),
        }
    }

    /// Wraps an arbitrary error as [`StorageFailure::Generic`].
    pub fn storage(cause: impl StdError + Send + Sync + 'static) -> Self {
        StorageFailure::Generic {
            cause: Arc::new(cause),
        }
        .into()
    }

    /// Returns true if retrying the same operation later may succeed.
    ///
    /// Pure function of branch and sub-variant: the retryable federation
    /// failures and missing legal hold consent are retryable, everything
    /// else is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreFailure::Network(NetworkFailure::FederatedBackend(failure)) => {
                failure.is_retryable()
            }
            _ => self.is_missing_legal_hold_consent_error(),
        }
    }

    /// Returns true for conditions expected to clear up without any state
    /// change: connectivity loss, backend outages and generic storage errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            CoreFailure::Network(NetworkFailure::NoNetworkConnection { .. })
            | CoreFailure::Network(NetworkFailure::ProxyError { .. })
            | CoreFailure::Storage(StorageFailure::Generic { .. }) => true,
            CoreFailure::Network(NetworkFailure::ServerMiscommunication { error }) => {
                error.is_server_side()
            }
            _ => false,
        }
    }

    /// Returns true if a sync step that hit this failure should be attempted
    /// again with the same input.
    ///
    /// This is the scheduling rule used by the sync loop: the retryable
    /// failures of [`is_retryable`](Self::is_retryable) plus the transient
    /// ones of [`is_transient`](Self::is_transient). Everything else halts
    /// the step.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.is_retryable() || self.is_transient()
    }

    /// Returns true for a federation failure listing at least one unreachable domain.
    #[must_use]
    pub fn has_unreachable_domains_error(&self) -> bool {
        matches!(
            self,
            CoreFailure::Network(NetworkFailure::FederatedBackend(
                FederatedBackendFailure::FailedDomains { domains }
            )) if !domains.is_empty()
        )
    }

    /// Returns true for a federation failure listing at least one conflicting domain.
    #[must_use]
    pub fn has_conflicting_domains_error(&self) -> bool {
        matches!(
            self,
            CoreFailure::Network(NetworkFailure::FederatedBackend(
                FederatedBackendFailure::ConflictingBackends { domains }
            )) if !domains.is_empty()
        )
    }

    /// Returns true for a 4xx backend answer.
    #[must_use]
    pub fn is_invalid_request_error(&self) -> bool {
        matches!(
            self,
            CoreFailure::Network(NetworkFailure::ServerMiscommunication { error })
                if error.is_invalid_request()
        )
    }

    /// Returns true if the backend rejected the request for missing legal hold consent.
    #[must_use]
    pub fn is_missing_legal_hold_consent_error(&self) -> bool {
        matches!(
            self,
            CoreFailure::Network(NetworkFailure::ServerMiscommunication { error })
                if error.is_invalid_request() && error.label == MISSING_LEGAL_HOLD_CONSENT_LABEL
        )
    }

    /// Returns true for [`StorageFailure::DataNotFound`].
    #[must_use]
    pub fn is_data_not_found(&self) -> bool {
        matches!(self, CoreFailure::Storage(StorageFailure::DataNotFound))
    }

    /// Returns true for [`FeatureFailure::MissingClientRegistration`].
    #[must_use]
    pub fn is_missing_client_registration(&self) -> bool {
        matches!(
            self,
            CoreFailure::Feature(FeatureFailure::MissingClientRegistration)
        )
    }

    /// Returns a short branch name for structured logs.
    #[must_use]
    pub fn branch(&self) -> &'static str {
        match self {
            CoreFailure::Network(_) => "network",
            CoreFailure::Storage(_) => "storage",
            CoreFailure::Mls(_) => "mls",
            CoreFailure::Proteus(_) => "proteus",
            CoreFailure::E2ei(_) => "e2ei",
            CoreFailure::Feature(_) => "feature",
            CoreFailure::Unknown { .. } => "unknown",
        }
    }
}

impl From<ServerError> for CoreFailure {
    fn from(error: ServerError) -> Self {
        NetworkFailure::ServerMiscommunication { error }.into()
    }
}

impl From<FederatedBackendFailure> for CoreFailure {
    fn from(failure: FederatedBackendFailure) -> Self {
        NetworkFailure::FederatedBackend(failure).into()
    }
}
