//! Multi-account supervision.
//!
//! Each logged-in account gets its own coordinator and its own task. Accounts
//! share nothing: one account failing or logging out does not touch another.

use crate::backend::BackendClient;
use crate::config::RetryConfig;
use crate::coordinator::SyncCoordinator;
use crate::error::{SyncError, SyncResult};
use msgsync_protocol::UserId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct AccountHandle<B: BackendClient + 'static> {
    coordinator: Arc<SyncCoordinator<B>>,
    task: JoinHandle<SyncResult<()>>,
}

/// Runs one coordinator per account.
///
/// A run that fails is restarted after a backoff taken from the restart
/// policy; the failed run already requested a slow sync, so the restart
/// rebuilds state before resuming. Logout and stop end the account's task.
pub struct AccountRegistry<B: BackendClient + 'static> {
    accounts: RwLock<HashMap<UserId, AccountHandle<B>>>,
    restart: RetryConfig,
}

impl<B: BackendClient + 'static> AccountRegistry<B> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::with_restart_policy(
            RetryConfig::new(u32::MAX).with_max_delay(Duration::from_secs(300)),
        )
    }

    /// Creates an empty registry restarting failed runs with `restart`.
    ///
    /// Only the delays of the policy are used; failed runs are restarted
    /// until the account is stopped.
    pub fn with_restart_policy(restart: RetryConfig) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            restart,
        }
    }

    /// Starts syncing the account of `coordinator` on the current runtime.
    pub fn start(&self, coordinator: SyncCoordinator<B>) -> SyncResult<Arc<SyncCoordinator<B>>> {
        let user = coordinator.config().self_user.clone();
        let mut accounts = self.accounts.write();
        if let Some(existing) = accounts.get(&user) {
            if !existing.task.is_finished() {
                return Err(SyncError::AlreadyRunning(user.obfuscated()));
            }
        }

        let coordinator = Arc::new(coordinator);
        let task = tokio::spawn(supervise(coordinator.clone(), self.restart.clone()));
        accounts.insert(
            user,
            AccountHandle {
                coordinator: coordinator.clone(),
                task,
            },
        );
        Ok(coordinator)
    }

    /// Returns the coordinator of `user`.
    pub fn get(&self, user: &UserId) -> Option<Arc<SyncCoordinator<B>>> {
        self.accounts
            .read()
            .get(user)
            .map(|handle| handle.coordinator.clone())
    }

    /// Returns every registered account.
    pub fn accounts(&self) -> Vec<UserId> {
        self.accounts.read().keys().cloned().collect()
    }

    /// Returns true if the task of `user` is still running.
    pub fn is_running(&self, user: &UserId) -> bool {
        self.accounts
            .read()
            .get(user)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Stops `user` and waits for its task. Returns `None` for an unknown account.
    pub async fn stop(&self, user: &UserId) -> Option<SyncResult<()>> {
        let handle = self.accounts.write().remove(user)?;
        handle.coordinator.stop();
        Some(join(handle.task).await)
    }

    /// Stops every account.
    pub async fn stop_all(&self) {
        let handles: Vec<(UserId, AccountHandle<B>)> = self.accounts.write().drain().collect();
        for (_, handle) in &handles {
            handle.coordinator.stop();
        }
        for (user, handle) in handles {
            if let Err(err) = join(handle.task).await {
                tracing::debug!(account = %user.obfuscated(), error = %err, "account ended with error");
            }
        }
    }
}

impl<B: BackendClient + 'static> Default for AccountRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BackendClient + 'static> std::fmt::Debug for AccountRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("accounts", &self.accounts.read().len())
            .finish_non_exhaustive()
    }
}

async fn supervise<B: BackendClient + 'static>(
    coordinator: Arc<SyncCoordinator<B>>,
    restart: RetryConfig,
) -> SyncResult<()> {
    let mut restarts = 0u32;
    loop {
        match coordinator.run().await {
            Err(SyncError::Failed(failure)) => {
                restarts = restarts.saturating_add(1);
                let delay = restart.delay_for_attempt(restarts);
                tracing::warn!(
                    account = %coordinator.context().logger.account(),
                    restarts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %failure,
                    "restarting failed sync"
                );
                tokio::select! {
                    biased;
                    _ = coordinator.stopped() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            other => return other,
        }
    }
}

async fn join(task: JoinHandle<SyncResult<()>>) -> SyncResult<()> {
    match task.await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(error = %err, "account task aborted");
            Err(SyncError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, MockBackend};
    use crate::config::SyncConfig;
    use crate::crypto::{CryptoClients, MockCrypto};
    use crate::session::{LogoutReason, Session};
    use msgsync_core::boundary::ApiError;
    use msgsync_core::store::MemoryStore;
    use msgsync_core::{EventStore, Storage};
    use msgsync_protocol::{ClientId, UserProfile};

    fn coordinator(user: &UserId) -> SyncCoordinator<MockBackend> {
        let backend = MockBackend::new(UserProfile {
            id: user.clone(),
            name: user.value.clone(),
            handle: None,
            team: None,
            deleted: false,
        });
        let events = EventStore::in_memory();
        events
            .metadata()
            .set_current_client_id(&ClientId::new("device"))
            .unwrap();
        SyncCoordinator::new(
            SyncConfig::new(user.clone()).with_slow_sync_retry(RetryConfig::immediate(1)),
            backend,
            events,
            Storage::from_memory(Arc::new(MemoryStore::new())),
            CryptoClients::mock(Arc::new(MockCrypto::new())),
            Session::new(),
        )
    }

    fn registry() -> AccountRegistry<MockBackend> {
        AccountRegistry::with_restart_policy(RetryConfig::immediate(1))
    }

    #[tokio::test]
    async fn accounts_sync_independently() {
        let alice = UserId::new("alice", "wire.com");
        let bob = UserId::new("bob", "foo.com");
        let registry = registry();
        let first = registry.start(coordinator(&alice)).unwrap();
        let second = registry.start(coordinator(&bob)).unwrap();

        first.wait_until_live().await.unwrap();
        second.wait_until_live().await.unwrap();
        assert_eq!(registry.accounts().len(), 2);

        first.session().logout(LogoutReason::SelfSoftLogout);
        let ended = registry.stop(&alice).await.unwrap();
        assert!(matches!(ended, Err(SyncError::LoggedOut(_))));
        assert!(registry.is_running(&bob));

        registry.stop_all().await;
        assert!(registry.accounts().is_empty());
    }

    #[tokio::test]
    async fn same_account_cannot_start_twice() {
        let alice = UserId::new("alice", "wire.com");
        let registry = registry();
        registry.start(coordinator(&alice)).unwrap();

        let err = registry.start(coordinator(&alice)).unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning(_)));

        assert!(registry.stop(&alice).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn failed_run_is_restarted() {
        let alice = UserId::new("alice", "wire.com");
        let coordinator = coordinator(&alice);
        coordinator
            .backend()
            .fail_next(BackendOp::SelfUser, ApiError::no_network("offline"));
        let registry = registry();
        let running = registry.start(coordinator).unwrap();

        let mut states = running.subscribe();
        states
            .wait_for(|state| state.is_live())
            .await
            .unwrap();

        let stats = running.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.slow_syncs, 1);
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn unknown_account_stop_is_none() {
        let registry = registry();
        assert!(registry
            .stop(&UserId::new("nobody", "wire.com"))
            .await
            .is_none());
    }
}
