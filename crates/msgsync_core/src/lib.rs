//! # msgsync Core
//!
//! Local foundations of the msgsync engine.
//!
//! This crate provides:
//! - The [`CoreFailure`] taxonomy and its boundary conversions
//! - The [`EventStore`] holding inbound events and the sync cursor
//! - Typed metadata access over a key/value store
//! - Storage contracts for conversations, users, connections and messages
//! - Forward-only metadata migrations
//!
//! ## Key Invariants
//!
//! - Unprocessed events are exposed lowest id first
//! - The cursor only moves forward, and only together with the processed flag
//! - Raw errors are converted into a [`CoreFailure`] exactly once

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod boundary;
mod config;
mod error;
mod event_store;
pub mod metadata;
pub mod migration;
mod model;
pub mod store;

pub use config::CoreConfig;
pub use error::{
    Cause, CoreFailure, CoreResult, E2eiFailure, FeatureFailure, FederatedBackendFailure,
    MlsFailure, NetworkFailure, NoCommonProtocol, ProteusErrorCode, ProteusFailure, ServerError,
    StorageFailure, MISSING_LEGAL_HOLD_CONSENT_LABEL,
};
pub use event_store::EventStore;
pub use metadata::SyncMetadata;
pub use migration::{MigrationManager, MigrationRunResult};
pub use model::{
    Client, Conversation, E2eiSettings, FederationStopReason, GroupState, LegalHoldStatus,
    Message, MessageContent, ProtocolState, SystemContent, Team, User, UserConfig,
    VerificationStatus,
};
pub use store::Storage;
