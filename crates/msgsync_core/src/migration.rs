//! Metadata migrations.
//!
//! Migrations are forward-only and run once each. The highest applied
//! version is stored under [`keys::SCHEMA_VERSION`](crate::metadata::keys::SCHEMA_VERSION);
//! a migration is recorded right after it succeeds, so a failed run resumes
//! at the failed migration.
//!
//! ## Usage
//!
//! ```
//! use msgsync_core::migration::MigrationManager;
//! use msgsync_core::EventStore;
//!
//! let events = EventStore::in_memory();
//! let result = MigrationManager::standard().run_pending(&events).unwrap();
//! assert_eq!(result.final_version, 1);
//! ```

use crate::error::CoreResult;
use crate::event_store::EventStore;
use crate::metadata::SyncMetadata;
use msgsync_protocol::EventId;
use std::collections::BTreeMap;

/// Version number for migrations.
pub type MigrationVersion = u32;

/// What a cursor reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorReconciliation {
    /// Cursor set to the highest processed event.
    FromProcessed(EventId),
    /// No processed event existed; cursor set to the lowest unprocessed one.
    FromUnprocessed(EventId),
    /// No cursor key or no events were stored; the cursor was left alone.
    Unchanged,
}

/// Rebuilds the sync cursor from stored events.
///
/// Only an existing cursor key is rewritten. It becomes the highest
/// processed id if any event is processed, else the lowest unprocessed id,
/// else it is left unchanged. Processed events are then dropped; unprocessed
/// ones are kept so they still get routed.
pub fn reconcile_cursor(events: &EventStore) -> CoreResult<CursorReconciliation> {
    let metadata = events.metadata();
    let outcome = if metadata.last_processed_event_id()?.is_none() {
        CursorReconciliation::Unchanged
    } else if let Some(latest) = events.latest_processed_id() {
        metadata.set_last_processed_event_id(&latest)?;
        CursorReconciliation::FromProcessed(latest)
    } else if let Some(earliest) = events.first_unprocessed().map(|event| event.id) {
        metadata.set_last_processed_event_id(&earliest)?;
        CursorReconciliation::FromUnprocessed(earliest)
    } else {
        CursorReconciliation::Unchanged
    };
    let pruned = events.delete_all_processed_events()?;
    tracing::info!(outcome = ?outcome, pruned, "sync cursor reconciled");
    Ok(outcome)
}

/// Context handed to a running migration.
#[derive(Debug)]
pub struct MigrationContext<'a> {
    /// Event store, with the metadata it writes to.
    pub events: &'a EventStore,
    /// Notes recorded by the migration for logging.
    pub notes: Vec<String>,
}

impl MigrationContext<'_> {
    /// Returns the metadata.
    #[must_use]
    pub fn metadata(&self) -> &SyncMetadata {
        self.events.metadata()
    }

    /// Records a note.
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// A forward-only migration.
pub trait Migration: Send + Sync {
    /// Unique version, starting at 1.
    fn version(&self) -> MigrationVersion;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Applies the migration.
    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()>;
}

/// Rebuilds the single-key cursor from event rows written by older schemas
/// that tracked progress only through per-event processed flags.
#[derive(Debug, Default)]
pub struct ReconstructSyncCursor;

impl Migration for ReconstructSyncCursor {
    fn version(&self) -> MigrationVersion {
        1
    }

    fn name(&self) -> &str {
        "reconstruct_sync_cursor"
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        let outcome = reconcile_cursor(ctx.events)?;
        ctx.note(format!("{outcome:?}"));
        Ok(())
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationRunResult {
    /// Applied migrations as (version, name).
    pub applied: Vec<(MigrationVersion, String)>,
    /// Schema version after the run.
    pub final_version: MigrationVersion,
}

/// Registry and runner of migrations.
#[derive(Default)]
pub struct MigrationManager {
    migrations: BTreeMap<MigrationVersion, Box<dyn Migration>>,
}

impl MigrationManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager with every built-in migration registered.
    #[must_use]
    pub fn standard() -> Self {
        Self::new().with(Box::new(ReconstructSyncCursor))
    }

    /// Registers a migration. A later registration replaces an earlier one
    /// with the same version.
    #[must_use]
    pub fn with(mut self, migration: Box<dyn Migration>) -> Self {
        if let Some(replaced) = self.migrations.insert(migration.version(), migration) {
            tracing::warn!(version = replaced.version(), name = replaced.name(), "migration replaced");
        }
        self
    }

    /// Returns the registered versions in order.
    #[must_use]
    pub fn versions(&self) -> Vec<MigrationVersion> {
        self.migrations.keys().copied().collect()
    }

    /// Runs every migration newer than the stored schema version.
    pub fn run_pending(&self, events: &EventStore) -> CoreResult<MigrationRunResult> {
        let metadata = events.metadata();
        let mut result = MigrationRunResult {
            applied: Vec::new(),
            final_version: metadata.schema_version()?,
        };
        for (version, migration) in self.migrations.range(result.final_version + 1..) {
            let mut ctx = MigrationContext {
                events,
                notes: Vec::new(),
            };
            migration.up(&mut ctx)?;
            metadata.set_schema_version(*version)?;
            tracing::info!(version, name = migration.name(), notes = ?ctx.notes, "migration applied");
            result.applied.push((*version, migration.name().to_string()));
            result.final_version = *version;
        }
        Ok(result)
    }
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationManager")
            .field("versions", &self.versions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::error::{CoreFailure, FeatureFailure};
    use msgsync_protocol::{DomainEvent, Event};

    fn stored(id: &str, processed: bool) -> Event {
        let mut event = Event::new(id, DomainEvent::MissedNotifications);
        event.processed = processed;
        event
    }

    fn legacy_store(events: Vec<Event>) -> EventStore {
        let store = EventStore::new(SyncMetadata::in_memory(), &CoreConfig::default());
        store
            .metadata()
            .set_last_processed_event_id(&EventId::new("0000"))
            .unwrap();
        store.insert_events(events).unwrap();
        store
    }

    #[test]
    fn latest_processed_wins_over_earliest_unprocessed() {
        let store = legacy_store(vec![
            stored("0001", true),
            stored("0002", false),
            stored("0003", true),
        ]);
        let outcome = reconcile_cursor(&store).unwrap();
        assert_eq!(outcome, CursorReconciliation::FromProcessed(EventId::new("0003")));
        assert_eq!(
            store.metadata().last_processed_event_id().unwrap(),
            Some(EventId::new("0003"))
        );
        // The unprocessed event is still pending.
        assert_eq!(store.len(), 1);
        assert_eq!(store.first_unprocessed().unwrap().id.as_str(), "0002");
    }

    proptest::proptest! {
        #[test]
        fn reconciled_cursor_prefers_latest_processed(
            rows in proptest::collection::btree_map(1u32..1000, proptest::bool::ANY, 1..30)
        ) {
            let store = legacy_store(
                rows.iter()
                    .map(|(n, processed)| stored(&format!("{n:04}"), *processed))
                    .collect(),
            );
            let latest_processed = rows.iter().filter(|(_, p)| **p).map(|(n, _)| *n).max();
            let earliest = rows.keys().next().copied();
            let expected = latest_processed.or(earliest).map(|n| EventId::new(format!("{n:04}")));

            reconcile_cursor(&store).unwrap();
            proptest::prop_assert_eq!(store.metadata().last_processed_event_id().unwrap(), expected);
        }
    }

    #[test]
    fn only_unprocessed_uses_earliest() {
        let store = legacy_store(vec![stored("0007", false), stored("0004", false)]);
        let outcome = reconcile_cursor(&store).unwrap();
        assert_eq!(outcome, CursorReconciliation::FromUnprocessed(EventId::new("0004")));
        assert_eq!(
            store.metadata().last_processed_event_id().unwrap(),
            Some(EventId::new("0004"))
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn no_events_leaves_cursor_unchanged() {
        let store = legacy_store(Vec::new());
        store
            .metadata()
            .set_last_processed_event_id(&EventId::new("0099"))
            .unwrap();
        assert_eq!(reconcile_cursor(&store).unwrap(), CursorReconciliation::Unchanged);
        assert_eq!(
            store.metadata().last_processed_event_id().unwrap(),
            Some(EventId::new("0099"))
        );
    }

    #[test]
    fn missing_cursor_key_is_not_created() {
        let store = EventStore::in_memory();
        store.insert_events(vec![stored("0001", true)]).unwrap();
        assert_eq!(reconcile_cursor(&store).unwrap(), CursorReconciliation::Unchanged);
        assert_eq!(store.metadata().last_processed_event_id().unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn standard_migrations_run_once() {
        let store = legacy_store(vec![stored("0001", true)]);
        let first = MigrationManager::standard().run_pending(&store).unwrap();
        assert_eq!(first.applied, vec![(1, "reconstruct_sync_cursor".to_string())]);

        // Later progress must not be rewound by a second run.
        store
            .metadata()
            .set_last_processed_event_id(&EventId::new("0050"))
            .unwrap();
        let second = MigrationManager::standard().run_pending(&store).unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.final_version, 1);
        assert_eq!(
            store.metadata().last_processed_event_id().unwrap(),
            Some(EventId::new("0050"))
        );
    }

    struct Failing;

    impl Migration for Failing {
        fn version(&self) -> MigrationVersion {
            2
        }

        fn name(&self) -> &str {
            "failing"
        }

        fn up(&self, _ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
            Err(FeatureFailure::InvalidEventSenderId.into())
        }
    }

    #[test]
    fn failure_stops_and_keeps_earlier_versions() {
        let store = legacy_store(Vec::new());
        let manager = MigrationManager::standard().with(Box::new(Failing));
        assert_eq!(manager.versions(), vec![1, 2]);
        let err = manager.run_pending(&store).unwrap_err();
        assert!(matches!(err, CoreFailure::Feature(FeatureFailure::InvalidEventSenderId)));
        assert_eq!(store.metadata().schema_version().unwrap(), 1);
    }
}
