//! Reconcile command implementation.

use msgsync_core::migration::MigrationVersion;
use msgsync_core::{EventStore, MigrationManager};
use std::path::Path;
use tracing::info;

/// Outcome of a reconcile run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Migrations that ran, or would run on a dry run.
    pub migrations: Vec<MigrationVersion>,
    /// Cursor after the run.
    pub cursor: Option<String>,
    /// Events still waiting to be routed.
    pub unprocessed: usize,
}

/// Runs pending migrations over the metadata at `path`, with `events`
/// loaded into the event store first.
pub fn reconcile(
    path: &Path,
    events: Option<&Path>,
    dry_run: bool,
) -> Result<ReconcileOutcome, Box<dyn std::error::Error>> {
    let store: EventStore = super::open_store(path)?;
    if let Some(dump) = events {
        let loaded = store.insert_events(super::load_events(dump)?)?;
        info!(loaded, "events loaded from {:?}", dump);
    }

    let manager = MigrationManager::standard();
    let migrations = if dry_run {
        let current = store.metadata().schema_version()?;
        manager
            .versions()
            .into_iter()
            .filter(|version| *version > current)
            .collect()
    } else {
        manager
            .run_pending(&store)?
            .applied
            .into_iter()
            .map(|(version, _)| version)
            .collect()
    };

    Ok(ReconcileOutcome {
        migrations,
        cursor: store
            .metadata()
            .last_processed_event_id()?
            .map(|id| id.as_str().to_string()),
        unprocessed: store.unprocessed_count(),
    })
}

/// Runs the reconcile command.
pub fn run(path: &Path, events: Option<&Path>, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Reconciling sync metadata at {:?}", path);
    let outcome = reconcile(path, events, dry_run)?;

    let verb = if dry_run { "Pending" } else { "Applied" };
    if outcome.migrations.is_empty() {
        println!("{verb} migrations: none");
    } else {
        println!("{verb} migrations:");
        for version in &outcome.migrations {
            println!("  v{version}");
        }
    }
    println!(
        "Cursor: {}",
        outcome.cursor.as_deref().unwrap_or("-")
    );
    println!("Unprocessed events: {}", outcome.unprocessed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgsync_protocol::EventId;
    use msgsync_testkit::prelude::*;
    use tempfile::TempDir;

    fn dump(dir: &TempDir) -> std::path::PathBuf {
        let mut processed = missed("0002");
        processed.processed = true;
        let path = dir.path().join("events.json");
        std::fs::write(
            &path,
            events_to_json(&[missed("0001"), processed, missed("0003")]),
        )
        .unwrap();
        path
    }

    #[test]
    fn cursor_moves_to_highest_processed_event() {
        let dir = TempDir::new().unwrap();
        let metadata = dir.path().join("metadata.json");
        super::super::open_store(&metadata)
            .unwrap()
            .metadata()
            .set_last_processed_event_id(&EventId::new("0000"))
            .unwrap();

        let outcome = reconcile(&metadata, Some(&dump(&dir)), false).unwrap();

        assert_eq!(outcome.migrations.len(), 1);
        assert_eq!(outcome.cursor.as_deref(), Some("0002"));
        assert_eq!(outcome.unprocessed, 2);

        // Already applied: a second run does nothing.
        let again = reconcile(&metadata, None, false).unwrap();
        assert!(again.migrations.is_empty());
        assert_eq!(again.cursor.as_deref(), Some("0002"));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let metadata = dir.path().join("metadata.json");
        super::super::open_store(&metadata)
            .unwrap()
            .metadata()
            .set_last_processed_event_id(&EventId::new("0000"))
            .unwrap();

        let outcome = reconcile(&metadata, Some(&dump(&dir)), true).unwrap();

        assert_eq!(outcome.migrations.len(), 1);
        assert_eq!(outcome.cursor.as_deref(), Some("0000"));
    }
}
