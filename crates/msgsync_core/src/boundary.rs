//! Raw errors of the external collaborators and their conversion into
//! [`CoreFailure`].
//!
//! Each boundary (storage, backend API, crypto) has its own raw error type.
//! Callers convert at the call site with the `wrap_*` extension methods:
//!
//! ```
//! use msgsync_core::boundary::{StoreError, StoreResultExt};
//!
//! fn load() -> Result<u32, StoreError> {
//!     Err(StoreError::NotFound)
//! }
//!
//! let failure = load().wrap_storage().unwrap_err();
//! assert!(failure.is_data_not_found());
//! ```
//!
//! The conversion logs the raw error once; code further up only sees the
//! typed failure and does not log it again.

use crate::error::{
    CoreFailure, CoreResult, E2eiFailure, FederatedBackendFailure, MlsFailure, NetworkFailure,
    ProteusErrorCode, ProteusFailure, ServerError, StorageFailure,
};
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Raw error of the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("row not found")]
    NotFound,

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend error.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type of raw store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Raw error of the backend API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No connectivity.
    #[error("network unavailable: {message}")]
    NoNetwork {
        /// Transport message.
        message: String,
    },

    /// Proxy failure.
    #[error("proxy error: {message}")]
    Proxy {
        /// Transport message.
        message: String,
    },

    /// 4xx answer.
    #[error("invalid request {status} {label}: {message}")]
    InvalidRequest {
        /// HTTP status.
        status: u16,
        /// Backend label.
        label: String,
        /// Backend message.
        message: String,
    },

    /// 5xx answer.
    #[error("server error {status} {label}: {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Backend label.
        label: String,
        /// Backend message.
        message: String,
    },

    /// The remote backend refused to federate.
    #[error("federation denied: {label}")]
    FederationDenied {
        /// Backend label.
        label: String,
    },

    /// Federation is disabled.
    #[error("federation not enabled: {label}")]
    FederationNotEnabled {
        /// Backend label.
        label: String,
    },

    /// Other federation error.
    #[error("federation error: {label}")]
    Federation {
        /// Backend label.
        label: String,
    },

    /// Some backends were unreachable.
    #[error("unreachable backends: {domains:?}")]
    Unreachable {
        /// Unreachable domains.
        domains: Vec<String>,
    },

    /// The involved backends do not federate with each other.
    #[error("non-federating backends: {domains:?}")]
    Conflict {
        /// Conflicting domains.
        domains: Vec<String>,
    },

    /// The backend does not support the requested API.
    #[error("API not supported by the backend")]
    NotSupported,

    /// The answer could not be decoded.
    #[error("response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Creates a 4xx error.
    pub fn invalid_request(status: u16, label: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::InvalidRequest {
            status,
            label: label.into(),
            message: message.into(),
        }
    }

    /// Creates a 404 error.
    pub fn not_found(label: impl Into<String>) -> Self {
        Self::invalid_request(404, label, "not found")
    }

    /// Creates a no-connectivity error.
    pub fn no_network(message: impl Into<String>) -> Self {
        ApiError::NoNetwork {
            message: message.into(),
        }
    }
}

/// Result type of raw backend calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error kinds reported by the MLS layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MlsErrorKind {
    /// See [`MlsFailure::WrongEpoch`].
    WrongEpoch,
    /// See [`MlsFailure::DuplicateMessage`].
    DuplicateMessage,
    /// See [`MlsFailure::BufferedFutureMessage`].
    BufferedFutureMessage,
    /// See [`MlsFailure::SelfCommitIgnored`].
    SelfCommitIgnored,
    /// See [`MlsFailure::UnmergedPendingGroup`].
    UnmergedPendingGroup,
    /// See [`MlsFailure::ConversationAlreadyExists`].
    ConversationAlreadyExists,
    /// See [`MlsFailure::MessageEpochTooOld`].
    MessageEpochTooOld,
    /// See [`MlsFailure::StaleProposal`].
    StaleProposal,
    /// See [`MlsFailure::StaleCommit`].
    StaleCommit,
    /// See [`MlsFailure::CommitForMissingProposal`].
    CommitForMissingProposal,
    /// See [`MlsFailure::ConversationNotFound`].
    ConversationNotFound,
    /// See [`MlsFailure::OrphanWelcome`].
    OrphanWelcome,
    /// See [`MlsFailure::InternalErrors`].
    Internal,
    /// Anything else.
    Other,
}

/// Raw error of the crypto layer.
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// MLS error.
    #[error("mls error {kind:?}: {message}")]
    Mls {
        /// Error kind.
        kind: MlsErrorKind,
        /// Crypto layer message.
        message: String,
    },

    /// Proteus error.
    #[error("proteus error {code:?}: {message}")]
    Proteus {
        /// Error code.
        code: ProteusErrorCode,
        /// Crypto layer message.
        message: String,
    },

    /// End-to-end identity error.
    #[error("e2ei error: {message}")]
    E2ei {
        /// Crypto layer message.
        message: String,
    },
}

impl CryptoError {
    /// Creates an MLS error.
    pub fn mls(kind: MlsErrorKind, message: impl Into<String>) -> Self {
        CryptoError::Mls {
            kind,
            message: message.into(),
        }
    }

    /// Creates a Proteus error.
    pub fn proteus(code: ProteusErrorCode, message: impl Into<String>) -> Self {
        CryptoError::Proteus {
            code,
            message: message.into(),
        }
    }
}

/// Result type of raw crypto calls.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Converts raw store results.
pub trait StoreResultExt<T> {
    /// Maps a raw store error into [`StorageFailure`].
    fn wrap_storage(self) -> CoreResult<T>;
}

impl<T> StoreResultExt<T> for StoreResult<T> {
    fn wrap_storage(self) -> CoreResult<T> {
        self.map_err(storage_failure)
    }
}

/// Converts raw backend results.
pub trait ApiResultExt<T> {
    /// Maps a raw API error into [`NetworkFailure`].
    fn wrap_api(self) -> CoreResult<T>;
}

impl<T> ApiResultExt<T> for ApiResult<T> {
    fn wrap_api(self) -> CoreResult<T> {
        self.map_err(network_failure)
    }
}

/// Converts raw crypto results.
pub trait CryptoResultExt<T> {
    /// Maps a raw error from an MLS call.
    fn wrap_mls(self) -> CoreResult<T>;
    /// Maps a raw error from a Proteus call.
    fn wrap_proteus(self) -> CoreResult<T>;
    /// Maps a raw error from an E2EI call.
    fn wrap_e2ei(self) -> CoreResult<T>;
}

impl<T> CryptoResultExt<T> for CryptoResult<T> {
    fn wrap_mls(self) -> CoreResult<T> {
        self.map_err(crypto_failure)
    }

    fn wrap_proteus(self) -> CoreResult<T> {
        self.map_err(crypto_failure)
    }

    fn wrap_e2ei(self) -> CoreResult<T> {
        self.map_err(crypto_failure)
    }
}

fn storage_failure(error: StoreError) -> CoreFailure {
    match error {
        StoreError::NotFound => {
            tracing::debug!("storage row not found");
            StorageFailure::DataNotFound.into()
        }
        other => {
            tracing::error!(error = %other, "storage call failed");
            StorageFailure::Generic {
                cause: Arc::new(other),
            }
            .into()
        }
    }
}

fn network_failure(error: ApiError) -> CoreFailure {
    tracing::warn!(error = %error, "backend call failed");
    match error {
        ApiError::NoNetwork { .. } => NetworkFailure::NoNetworkConnection {
            cause: Some(Arc::new(error)),
        }
        .into(),
        ApiError::Proxy { .. } => NetworkFailure::ProxyError {
            cause: Some(Arc::new(error)),
        }
        .into(),
        ApiError::InvalidRequest {
            status,
            label,
            message,
        }
        | ApiError::Server {
            status,
            label,
            message,
        } => ServerError {
            status,
            label,
            message,
        }
        .into(),
        ApiError::FederationDenied { label } => {
            FederatedBackendFailure::FederationDenied { label }.into()
        }
        ApiError::FederationNotEnabled { label } => {
            FederatedBackendFailure::FederationNotEnabled { label }.into()
        }
        ApiError::Federation { label } => FederatedBackendFailure::General { label }.into(),
        ApiError::Unreachable { domains } => FederatedBackendFailure::FailedDomains { domains }.into(),
        ApiError::Conflict { domains } => {
            FederatedBackendFailure::ConflictingBackends { domains }.into()
        }
        ApiError::NotSupported => NetworkFailure::FeatureNotSupported.into(),
        ApiError::Decode(err) => ServerError::new(0, "decode-error", err.to_string()).into(),
    }
}

fn crypto_failure(error: CryptoError) -> CoreFailure {
    match &error {
        CryptoError::Mls { kind, .. } => {
            let failure = match kind {
                MlsErrorKind::WrongEpoch => MlsFailure::WrongEpoch,
                MlsErrorKind::DuplicateMessage => MlsFailure::DuplicateMessage,
                MlsErrorKind::BufferedFutureMessage => MlsFailure::BufferedFutureMessage,
                MlsErrorKind::SelfCommitIgnored => MlsFailure::SelfCommitIgnored,
                MlsErrorKind::UnmergedPendingGroup => MlsFailure::UnmergedPendingGroup,
                MlsErrorKind::ConversationAlreadyExists => MlsFailure::ConversationAlreadyExists,
                MlsErrorKind::MessageEpochTooOld => MlsFailure::MessageEpochTooOld,
                MlsErrorKind::StaleProposal => MlsFailure::StaleProposal,
                MlsErrorKind::StaleCommit => MlsFailure::StaleCommit,
                MlsErrorKind::CommitForMissingProposal => MlsFailure::CommitForMissingProposal,
                MlsErrorKind::ConversationNotFound => MlsFailure::ConversationNotFound,
                MlsErrorKind::OrphanWelcome => MlsFailure::OrphanWelcome,
                MlsErrorKind::Internal => MlsFailure::InternalErrors,
                MlsErrorKind::Other => MlsFailure::Generic {
                    cause: Arc::new(error.clone()),
                },
            };
            tracing::warn!(error = %error, "mls call failed");
            failure.into()
        }
        CryptoError::Proteus { code, .. } => {
            tracing::warn!(error = %error, "proteus call failed");
            ProteusFailure {
                code: *code,
                cause: Some(Arc::new(error.clone())),
            }
            .into()
        }
        CryptoError::E2ei { .. } => {
            tracing::warn!(error = %error, "e2ei call failed");
            E2eiFailure::Generic {
                cause: Arc::new(error.clone()),
            }
            .into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MISSING_LEGAL_HOLD_CONSENT_LABEL;
    use std::error::Error as _;

    #[test]
    fn store_errors_map_to_storage_branch() {
        let not_found: StoreResult<()> = Err(StoreError::NotFound);
        assert!(not_found.wrap_storage().unwrap_err().is_data_not_found());

        let io: StoreResult<()> = Err(io::Error::other("disk").into());
        let failure = io.wrap_storage().unwrap_err();
        assert!(matches!(failure, CoreFailure::Storage(StorageFailure::Generic { .. })));
        assert!(failure.source().is_some());
    }

    #[test]
    fn api_errors_map_to_network_branch() {
        let unreachable: ApiResult<()> = Err(ApiError::Unreachable {
            domains: vec!["foo.com".into()],
        });
        let failure = unreachable.wrap_api().unwrap_err();
        assert!(failure.has_unreachable_domains_error());
        assert!(failure.is_retryable());

        let offline: ApiResult<()> = Err(ApiError::no_network("offline"));
        let failure = offline.wrap_api().unwrap_err();
        assert!(matches!(
            failure,
            CoreFailure::Network(NetworkFailure::NoNetworkConnection { cause: Some(_) })
        ));

        let consent: ApiResult<()> = Err(ApiError::invalid_request(
            403,
            MISSING_LEGAL_HOLD_CONSENT_LABEL,
            "consent",
        ));
        assert!(consent.wrap_api().unwrap_err().is_missing_legal_hold_consent_error());
    }

    #[test]
    fn crypto_errors_map_by_kind() {
        let wrong_epoch: CryptoResult<()> = Err(CryptoError::mls(MlsErrorKind::WrongEpoch, "epoch 3"));
        assert!(matches!(
            wrong_epoch.wrap_mls().unwrap_err(),
            CoreFailure::Mls(MlsFailure::WrongEpoch)
        ));

        let other: CryptoResult<()> = Err(CryptoError::mls(MlsErrorKind::Other, "boom"));
        let failure = other.wrap_mls().unwrap_err();
        assert!(matches!(failure, CoreFailure::Mls(MlsFailure::Generic { .. })));
        assert!(failure.source().unwrap().to_string().contains("boom"));

        let proteus: CryptoResult<()> = Err(CryptoError::proteus(
            ProteusErrorCode::SessionNotFound,
            "no session",
        ));
        assert!(matches!(
            proteus.wrap_proteus().unwrap_err(),
            CoreFailure::Proteus(ProteusFailure {
                code: ProteusErrorCode::SessionNotFound,
                ..
            })
        ));
    }
}
