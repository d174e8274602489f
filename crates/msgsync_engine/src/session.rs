//! Account session handle and out-of-band sync requests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Why an account was logged out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogoutReason {
    /// The user logged out and kept local data.
    SelfSoftLogout,
    /// The user logged out and wiped local data.
    SelfHardLogout,
    /// The account was deleted.
    DeletedAccount,
    /// This device's client was removed.
    RemovedClient,
    /// The access token could not be refreshed.
    SessionExpired,
}

/// Session of one account.
///
/// Logging out cancels the session token, which every suspension point of
/// the account's sync task observes. Only the first reason is kept.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: CancellationToken,
    reason: Arc<Mutex<Option<LogoutReason>>>,
}

impl Session {
    /// Creates a live session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs the account out.
    pub fn logout(&self, reason: LogoutReason) {
        {
            let mut current = self.reason.lock();
            if current.is_some() {
                return;
            }
            *current = Some(reason);
        }
        tracing::warn!(?reason, "account logged out");
        self.token.cancel();
    }

    /// Returns the logout reason, if logged out.
    #[must_use]
    pub fn logout_reason(&self) -> Option<LogoutReason> {
        *self.reason.lock()
    }

    /// Returns true once logged out.
    #[must_use]
    pub fn is_logged_out(&self) -> bool {
        self.reason.lock().is_some()
    }

    /// Returns a token cancelled on logout.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Requests for a forced slow sync.
///
/// Any component may call [`SyncRequests::request_slow_sync`]; the
/// coordinator consumes the request with [`SyncRequests::take`] in whatever
/// state it is in.
#[derive(Debug, Clone, Default)]
pub struct SyncRequests {
    inner: Arc<RequestsInner>,
}

#[derive(Debug, Default)]
struct RequestsInner {
    slow_sync: AtomicBool,
    notify: Notify,
}

impl SyncRequests {
    /// Creates an empty request handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a slow sync.
    pub fn request_slow_sync(&self) {
        self.inner.slow_sync.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Returns true if a slow sync is requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.inner.slow_sync.load(Ordering::SeqCst)
    }

    /// Consumes a pending request.
    pub fn take(&self) -> bool {
        self.inner.slow_sync.swap(false, Ordering::SeqCst)
    }

    /// Waits until a slow sync is requested. Returns immediately if one is pending.
    pub async fn requested(&self) {
        while !self.is_requested() {
            self.inner.notify.notified().await;
        }
    }
}
