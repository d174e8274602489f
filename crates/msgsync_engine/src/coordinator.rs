//! Sync coordinator state machine.
//!
//! One coordinator drives one account:
//!
//! 1. **Slow sync** when requested or when no completed slow sync is recorded.
//! 2. **Pending fetch**: notifications after the stored cursor are paged into
//!    the [`EventStore`].
//! 3. **Incremental sync**: unprocessed events are handed to the
//!    [`EventHandler`] one at a time, in id order. The state reports
//!    [`EventSource::Pending`] until the backlog seen at the start of the
//!    phase is drained, then [`EventSource::Live`].
//!
//! Events are committed only after their handler succeeded, so a stop or a
//! crash mid-event replays that event on the next run.

use crate::backend::BackendClient;
use crate::config::{RetryConfig, SyncConfig};
use crate::context::AccountContext;
use crate::crypto::CryptoClients;
use crate::error::{SyncError, SyncResult};
use crate::logging::EventLogger;
use crate::router::{EventHandler, EventRouter};
use crate::session::{LogoutReason, Session, SyncRequests};
use crate::slow_sync::run_slow_sync;
use futures::StreamExt;
use msgsync_core::boundary::ApiResultExt;
use msgsync_core::{CoreFailure, CoreResult, EventStore, FeatureFailure, NetworkFailure, Storage};
use msgsync_protocol::{Event, EventId};
use parking_lot::RwLock;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Where the events being processed come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Catching up on events that arrived while offline.
    Pending,
    /// The backlog is drained; events are processed as they arrive.
    Live,
}

/// The current state of a coordinator.
#[derive(Debug, Clone)]
pub enum SyncState {
    /// Not running.
    Idle,
    /// Fetching full snapshots.
    SlowSync,
    /// Processing stored events.
    IncrementalSync(EventSource),
    /// Waiting before retrying a failed step.
    Retrying {
        /// Attempts made so far.
        attempt: u32,
        /// Failure of the last attempt.
        failure: CoreFailure,
    },
    /// A failure could not be retried away.
    Failed(CoreFailure),
    /// The account was logged out.
    LoggedOut(LogoutReason),
}

impl SyncState {
    /// Returns true while the coordinator is doing work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::SlowSync | SyncState::IncrementalSync(_) | SyncState::Retrying { .. }
        )
    }

    /// Returns true once the backlog is drained.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, SyncState::IncrementalSync(EventSource::Live))
    }

    /// Returns true if a run may start from this state.
    #[must_use]
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Failed(_))
    }

    fn name(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::SlowSync => "slow_sync",
            SyncState::IncrementalSync(EventSource::Pending) => "incremental_pending",
            SyncState::IncrementalSync(EventSource::Live) => "incremental_live",
            SyncState::Retrying { .. } => "retrying",
            SyncState::Failed(_) => "failed",
            SyncState::LoggedOut(_) => "logged_out",
        }
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Slow syncs completed.
    pub slow_syncs: u64,
    /// Events fetched from the pending log.
    pub events_fetched: u64,
    /// Events handled and committed.
    pub events_processed: u64,
    /// Retries of any step.
    pub retries: u64,
    /// Failures that ended a run.
    pub failures: u64,
    /// Id of the last committed event.
    pub last_event_id: Option<EventId>,
    /// Time the backlog was last drained.
    pub last_live_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Drives slow and incremental sync for one account.
pub struct SyncCoordinator<B: BackendClient + 'static> {
    config: SyncConfig,
    backend: Arc<B>,
    events: EventStore,
    ctx: AccountContext,
    handler: Arc<dyn EventHandler>,
    state: watch::Sender<SyncState>,
    stats: RwLock<SyncStats>,
    running: AtomicBool,
    stop: CancellationToken,
}

impl<B: BackendClient + 'static> SyncCoordinator<B> {
    /// Creates a coordinator routing events through an [`EventRouter`].
    ///
    /// Sync metadata is taken from `events`, so the cursor the store commits
    /// is the one slow sync writes.
    pub fn new(
        config: SyncConfig,
        backend: B,
        events: EventStore,
        storage: Storage,
        crypto: CryptoClients,
        session: Session,
    ) -> Self {
        let backend = Arc::new(backend);
        let stop = session.token().child_token();
        let ctx = AccountContext {
            self_user: config.self_user.clone(),
            storage,
            metadata: events.metadata().clone(),
            backend: backend.clone(),
            logger: EventLogger::new(&config.self_user),
            session,
            requests: SyncRequests::new(),
        };
        let handler = Arc::new(EventRouter::new(
            ctx.clone(),
            crypto,
            config.history_lost_messages,
        ));
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            config,
            backend,
            events,
            ctx,
            handler,
            state,
            stats: RwLock::new(SyncStats::default()),
            running: AtomicBool::new(false),
            stop,
        }
    }

    /// Replaces the event handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Returns a copy of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the backend client.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the event store.
    pub fn events(&self) -> &EventStore {
        &self.events
    }

    /// Returns local storage.
    pub fn storage(&self) -> &Storage {
        &self.ctx.storage
    }

    /// Returns the session.
    pub fn session(&self) -> &Session {
        &self.ctx.session
    }

    /// Returns the slow sync request handle shared with the receivers.
    pub fn requests(&self) -> &SyncRequests {
        &self.ctx.requests
    }

    /// Returns the account context handed to the receivers.
    pub fn context(&self) -> &AccountContext {
        &self.ctx
    }

    /// Requests a slow sync. A running coordinator picks it up before the
    /// next event.
    pub fn request_slow_sync(&self) {
        self.ctx.requests.request_slow_sync();
    }

    /// Stops the coordinator. [`run`](Self::run) returns after the current
    /// event is abandoned; a stopped coordinator cannot be run again.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Returns true once [`stop`](Self::stop) was called or the session ended.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Completes once the coordinator is stopped.
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }

    /// Waits until the coordinator reports live.
    ///
    /// Fails if the coordinator fails, is logged out or is stopped first.
    pub async fn wait_until_live(&self) -> SyncResult<()> {
        let mut states = self.state.subscribe();
        let reached = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Err(self.stopped_error()),
            reached = states.wait_for(|state| {
                matches!(
                    state,
                    SyncState::IncrementalSync(EventSource::Live)
                        | SyncState::Failed(_)
                        | SyncState::LoggedOut(_)
                )
            }) => reached.map(|state| state.clone()),
        };
        match reached {
            Ok(SyncState::Failed(failure)) => Err(SyncError::Failed(failure)),
            Ok(SyncState::LoggedOut(reason)) => Err(SyncError::LoggedOut(reason)),
            Ok(_) => Ok(()),
            Err(_) => Err(SyncError::Cancelled),
        }
    }

    /// Runs sync until stopped, logged out or failed.
    ///
    /// Returns `Ok` when stopped. A failure that retries cannot clear leaves
    /// the state [`SyncState::Failed`], requests a slow sync and is returned;
    /// running again resumes from the persisted cursor.
    pub async fn run(&self) -> SyncResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SyncError::InvalidStateTransition {
                from: self.state().name().to_string(),
                to: "running".to_string(),
            });
        }
        let result = self.run_loop().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_loop(&self) -> SyncResult<()> {
        tracing::info!(account = %self.ctx.logger.account(), "sync started");
        loop {
            if let Some(reason) = self.ctx.session.logout_reason() {
                self.set_state(SyncState::LoggedOut(reason));
                tracing::info!(account = %self.ctx.logger.account(), ?reason, "sync ended by logout");
                return Err(SyncError::LoggedOut(reason));
            }
            if self.stop.is_cancelled() {
                self.set_state(SyncState::Idle);
                tracing::info!(account = %self.ctx.logger.account(), "sync stopped");
                return Ok(());
            }

            let requested = self.ctx.requests.take();
            let step = match self.needs_slow_sync(requested) {
                Ok(true) => self.slow_sync_with_retry().await,
                Ok(false) => self.incremental_sync().await,
                Err(failure) => Err(self.fail(failure)),
            };
            match step {
                Ok(()) | Err(SyncError::Cancelled) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn needs_slow_sync(&self, requested: bool) -> CoreResult<bool> {
        Ok(requested || self.ctx.metadata.slow_sync_completed_at()?.is_none())
    }

    async fn slow_sync_with_retry(&self) -> SyncResult<()> {
        let retry = &self.config.slow_sync_retry;
        let mut attempt = 0;
        loop {
            self.set_state(SyncState::SlowSync);
            let result = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Err(SyncError::Cancelled),
                result = run_slow_sync(&self.ctx, &self.events) => result,
            };
            let failure = match result {
                Ok(_) => {
                    self.stats.write().slow_syncs += 1;
                    return Ok(());
                }
                Err(failure) => failure,
            };
            if failure.is_missing_client_registration() {
                return Err(self.logout(LogoutReason::RemovedClient));
            }
            attempt += 1;
            tracing::warn!(
                account = %self.ctx.logger.account(),
                attempt,
                error = %failure,
                "slow sync failed"
            );
            if !failure.should_retry() || attempt >= retry.max_attempts {
                return Err(self.fail(failure));
            }
            self.backoff(retry, attempt, failure).await?;
        }
    }

    async fn incremental_sync(&self) -> SyncResult<()> {
        self.set_state(SyncState::IncrementalSync(EventSource::Pending));
        match self.fetch_pending_events().await {
            Ok(_) => {}
            Err(SyncError::Failed(failure)) if is_unknown_cursor(&failure) => {
                return self.on_unknown_cursor();
            }
            Err(err) => return Err(err),
        }

        let backlog_end = self.events.last_unprocessed_id();
        let mut source = EventSource::Pending;
        if backlog_end.is_none() {
            source = self.go_live();
        }

        let mut stream = pin!(self.events.observe_unprocessed_events());
        loop {
            let event = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Err(SyncError::Cancelled),
                _ = self.ctx.requests.requested() => return Ok(()),
                next = stream.next() => match next {
                    Some(event) => event,
                    None => return Ok(()),
                },
            };
            self.process_with_retry(&event, source).await?;

            if source == EventSource::Pending
                && backlog_end.as_ref().is_some_and(|end| event.id >= *end)
            {
                source = self.go_live();
            }
        }
    }

    /// Pages every notification after the cursor into the event store.
    async fn fetch_pending_events(&self) -> SyncResult<usize> {
        let retry = &self.config.event_retry;
        let mut since = self.ctx.metadata.last_processed_event_id()?;
        let mut fetched = 0;
        loop {
            let mut attempt = 0;
            let page = loop {
                let result = tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => return Err(SyncError::Cancelled),
                    result = self
                        .backend
                        .fetch_pending_events(since.as_ref(), self.config.pending_page_size) => result,
                };
                let failure = match result.wrap_api() {
                    Ok(page) => break page,
                    Err(failure) => failure,
                };
                if is_unknown_cursor(&failure) {
                    return Err(SyncError::Failed(failure));
                }
                attempt += 1;
                if !failure.should_retry() || attempt >= retry.max_attempts {
                    return Err(self.fail(failure));
                }
                self.backoff(retry, attempt, failure).await?;
                self.set_state(SyncState::IncrementalSync(EventSource::Pending));
            };

            if let Some(last) = page.events.last() {
                since = Some(last.id.clone());
            }
            let received = page.events.len();
            self.events.insert_events(page.events)?;
            fetched += received;
            if !page.has_more || received == 0 {
                break;
            }
        }
        self.stats.write().events_fetched += fetched as u64;
        tracing::debug!(account = %self.ctx.logger.account(), fetched, "pending events fetched");
        Ok(fetched)
    }

    /// The backend no longer knows the cursor: events were lost.
    fn on_unknown_cursor(&self) -> SyncResult<()> {
        tracing::warn!(
            account = %self.ctx.logger.account(),
            "last processed event unknown to the backend, forcing slow sync"
        );
        let failure: CoreFailure = FeatureFailure::SyncEventOrClientNotFound.into();
        self.stats.write().last_error = Some(failure.to_string());
        self.ctx.metadata.clear_slow_sync_completion()?;
        if self.config.history_lost_messages {
            self.ctx.metadata.set_history_lost_pending(true)?;
        }
        self.ctx.requests.request_slow_sync();
        Ok(())
    }

    async fn process_with_retry(&self, event: &Event, source: EventSource) -> SyncResult<()> {
        let retry = &self.config.event_retry;
        let mut attempt: u32 = 0;
        loop {
            let handled = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Err(SyncError::Cancelled),
                handled = self.handler.handle(event) => handled,
            };
            let failure = match handled.and_then(|()| self.events.commit_processed(event)) {
                Ok(()) => {
                    let mut stats = self.stats.write();
                    stats.events_processed += 1;
                    stats.last_event_id = Some(event.id.clone());
                    return Ok(());
                }
                Err(failure) => failure,
            };
            if failure.is_missing_client_registration() {
                return Err(self.logout(LogoutReason::RemovedClient));
            }
            if !failure.should_retry() {
                self.ctx.logger.failure(event, &failure, "giving up");
                self.ctx.requests.request_slow_sync();
                return Err(self.fail(failure));
            }
            // The same event is retried until it goes through; attempts past
            // the configured count keep the capped delay.
            attempt = attempt.saturating_add(1);
            if attempt == retry.max_attempts {
                tracing::warn!(
                    account = %self.ctx.logger.account(),
                    event = %event.id.obfuscated(),
                    attempt,
                    error = %failure,
                    "event still failing, backoff no longer grows"
                );
            } else {
                tracing::debug!(
                    account = %self.ctx.logger.account(),
                    event = %event.id.obfuscated(),
                    attempt,
                    error = %failure,
                    "retrying event"
                );
            }
            self.backoff(retry, attempt, failure).await?;
            self.set_state(SyncState::IncrementalSync(source));
        }
    }

    async fn backoff(&self, retry: &RetryConfig, attempt: u32, failure: CoreFailure) -> SyncResult<()> {
        self.stats.write().retries += 1;
        self.set_state(SyncState::Retrying { attempt, failure });
        let delay = retry.delay_for_attempt(attempt.min(retry.max_attempts));
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Err(SyncError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn go_live(&self) -> EventSource {
        self.stats.write().last_live_time = Some(Instant::now());
        self.set_state(SyncState::IncrementalSync(EventSource::Live));
        tracing::info!(account = %self.ctx.logger.account(), "sync is live");
        EventSource::Live
    }

    fn fail(&self, failure: CoreFailure) -> SyncError {
        {
            let mut stats = self.stats.write();
            stats.failures += 1;
            stats.last_error = Some(failure.to_string());
        }
        tracing::error!(account = %self.ctx.logger.account(), error = %failure, "sync failed");
        self.set_state(SyncState::Failed(failure.clone()));
        SyncError::Failed(failure)
    }

    fn logout(&self, reason: LogoutReason) -> SyncError {
        self.ctx.session.logout(reason);
        SyncError::Cancelled
    }

    fn stopped_error(&self) -> SyncError {
        match self.ctx.session.logout_reason() {
            Some(reason) => SyncError::LoggedOut(reason),
            None => SyncError::Cancelled,
        }
    }

    fn set_state(&self, state: SyncState) {
        let to = state.name();
        let previous = self.state.send_replace(state);
        if previous.name() != to {
            tracing::debug!(
                account = %self.ctx.logger.account(),
                from = previous.name(),
                to,
                "sync state changed"
            );
        }
    }
}

impl<B: BackendClient + 'static> std::fmt::Debug for SyncCoordinator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("account", &self.ctx.logger.account())
            .field("state", &self.state().name())
            .finish_non_exhaustive()
    }
}

fn is_unknown_cursor(failure: &CoreFailure) -> bool {
    matches!(
        failure,
        CoreFailure::Network(NetworkFailure::ServerMiscommunication { error }) if error.status == 404
    )
}
