//! Capabilities shared by the components of one account.

use crate::backend::BackendClient;
use crate::logging::EventLogger;
use crate::session::{Session, SyncRequests};
use msgsync_core::{Storage, SyncMetadata};
use msgsync_protocol::UserId;
use std::sync::Arc;

/// Everything a receiver may use, injected at construction.
#[derive(Clone)]
pub struct AccountContext {
    /// The account's own user.
    pub self_user: UserId,
    /// Local storage.
    pub storage: Storage,
    /// Persisted sync metadata.
    pub metadata: SyncMetadata,
    /// Backend client for follow-up lookups.
    pub backend: Arc<dyn BackendClient>,
    /// Event outcome logger.
    pub logger: EventLogger,
    /// Session, for logout.
    pub session: Session,
    /// Slow sync requests.
    pub requests: SyncRequests,
}

impl AccountContext {
    /// Returns the self domain.
    #[must_use]
    pub fn self_domain(&self) -> &str {
        &self.self_user.domain
    }
}

impl std::fmt::Debug for AccountContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountContext")
            .field("self_user", &self.self_user.obfuscated())
            .finish_non_exhaustive()
    }
}
