//! # msgsync Engine
//!
//! Sync orchestration for one or more messaging accounts.
//!
//! This crate provides:
//! - Sync coordinator state machine (slow sync → pending → live)
//! - Event routing to per-category domain receivers
//! - Federation cascade handling for removed domains and connections
//! - Retry with exponential backoff
//! - Backend and crypto client abstractions with in-memory mocks
//! - Per-account supervision
//!
//! ## Architecture
//!
//! The coordinator follows a **snapshot-then-replay** model:
//! 1. Slow sync stores full snapshots and the newest notification id
//! 2. Notifications after that id are fetched into the event store
//! 3. Events are routed one at a time, in id order, and committed
//!
//! ## Key Invariants
//!
//! - At most one event of an account is being handled at any time
//! - An event is committed only after its receiver succeeded
//! - Receivers are idempotent, so a replayed event changes nothing
//! - Accounts never share state

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accounts;
mod backend;
mod config;
mod context;
mod coordinator;
mod crypto;
mod error;
mod logging;
pub mod receivers;
mod router;
mod session;
mod slow_sync;

pub use accounts::AccountRegistry;
pub use backend::{BackendClient, BackendOp, MockBackend, PendingEventsPage};
pub use config::{RetryConfig, SyncConfig};
pub use context::AccountContext;
pub use coordinator::{EventSource, SyncCoordinator, SyncState, SyncStats};
pub use crypto::{CryptoClients, JoinedGroup, MlsClient, MlsDecrypted, MockCrypto, ProteusClient};
pub use error::{SyncError, SyncResult};
pub use logging::EventLogger;
pub use router::{EventHandler, EventRouter};
pub use session::{LogoutReason, Session, SyncRequests};
pub use slow_sync::{run_slow_sync, SlowSyncReport};
