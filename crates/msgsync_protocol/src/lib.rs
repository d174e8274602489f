//! # msgsync Protocol
//!
//! Event envelopes and domain event types for msgsync.
//!
//! This crate provides:
//! - Qualified identifiers for users and conversations
//! - The [`Event`] envelope delivered by the transport
//! - The [`DomainEvent`] tagged union, one enum per category
//! - Snapshot value types shared by events and full-state fetches
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod events;
mod model;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use event::Event;
pub use events::{
    ConversationEvent, DomainEvent, FeatureConfigEvent, FederationEvent, MemberChange,
    MemberLeaveReason, TeamEvent, UnknownEvent, UserEvent, UserPropertyEvent,
    MISSED_NOTIFICATIONS_TYPE,
};
pub use model::{
    Access, AccessRole, ClientInfo, Connection, ConnectionState, ConversationSnapshot,
    ConversationType, FeatureStatus, Member, MemberRole, MutedStatus, Protocol, ProtocolInfo,
    ReceiptMode, TeamSnapshot, UserProfile,
};
pub use types::{obfuscate, ClientId, ConversationId, EventId, QualifiedId, TeamId, UserId};
