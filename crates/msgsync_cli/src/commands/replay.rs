//! Replay command implementation.
//!
//! Serves an event dump from a mock backend to a fresh in-memory account
//! whose slow sync is already recorded, so every event in the dump is
//! fetched as backlog and routed. The account stops once it reports live.

use msgsync_core::{EventStore, Storage};
use msgsync_engine::{
    CryptoClients, MockBackend, MockCrypto, RetryConfig, Session, SyncConfig, SyncCoordinator,
    SyncState,
};
use msgsync_protocol::{ClientId, Event, UserId, UserProfile};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Outcome of a replay.
#[derive(Debug, Serialize)]
pub struct ReplayResult {
    /// Events in the dump.
    pub events: usize,
    /// Events routed and committed.
    pub processed: u64,
    /// Retries during the replay.
    pub retries: u64,
    /// Cursor after the replay.
    pub cursor: Option<String>,
    /// Final coordinator state.
    pub state: String,
    /// Last failure, if the replay stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Replays `events` for `self_user`.
pub async fn replay(
    events: Vec<Event>,
    self_user: UserId,
) -> Result<ReplayResult, Box<dyn std::error::Error>> {
    let count = events.len();
    let backend = MockBackend::new(UserProfile {
        id: self_user.clone(),
        name: self_user.value.clone(),
        handle: None,
        team: None,
        deleted: false,
    });
    backend.push_events(events);

    let store = EventStore::in_memory();
    let metadata = store.metadata();
    metadata.set_current_client_id(&ClientId::new("replay"))?;
    metadata.set_slow_sync_completed_at("1970-01-01T00:00:00Z")?;

    let config = SyncConfig::new(self_user)
        .with_event_retry(RetryConfig::immediate(3))
        .with_history_lost_messages(false);
    let coordinator = Arc::new(SyncCoordinator::new(
        config,
        backend,
        store,
        Storage::in_memory(),
        CryptoClients::mock(Arc::new(MockCrypto::new())),
        Session::new(),
    ));

    let runner = coordinator.clone();
    let task = tokio::spawn(async move { runner.run().await });
    let live = coordinator.wait_until_live().await;
    coordinator.stop();
    let ended = task.await?;

    let stats = coordinator.stats();
    let state = match coordinator.state() {
        SyncState::Failed(_) => "failed",
        SyncState::LoggedOut(_) => "logged_out",
        _ => "completed",
    };
    Ok(ReplayResult {
        events: count,
        processed: stats.events_processed,
        retries: stats.retries,
        cursor: stats.last_event_id.map(|id| id.as_str().to_string()),
        state: state.to_string(),
        error: live.err().or(ended.err()).map(|err| err.to_string()),
    })
}

/// Runs the replay command.
pub fn run(events: &Path, self_user: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let self_user = UserId::parse(self_user)
        .ok_or_else(|| format!("Invalid self user {self_user:?}, expected value@domain"))?;
    let events = super::load_events(events)?;
    info!(count = events.len(), "replaying events");

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(replay(events, self_user))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("Replay");
            println!("======");
            println!("  Events:      {}", result.events);
            println!("  Processed:   {}", result.processed);
            println!("  Retries:     {}", result.retries);
            println!("  Cursor:      {}", result.cursor.as_deref().unwrap_or("-"));
            println!("  State:       {}", result.state);
            if let Some(error) = &result.error {
                println!("  Error:       {error}");
            }
        }
    }
    Ok(())
}
