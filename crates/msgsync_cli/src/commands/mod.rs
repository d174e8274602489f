//! CLI command implementations.

pub mod inspect;
pub mod reconcile;
pub mod replay;

use msgsync_core::{CoreConfig, EventStore};
use msgsync_protocol::Event;
use std::path::Path;

/// Opens the event store over the metadata file at `path`.
pub fn open_store(path: &Path) -> Result<EventStore, Box<dyn std::error::Error>> {
    let config = CoreConfig::new().metadata_path(path);
    let metadata = config.open_metadata()?;
    Ok(EventStore::new(metadata, &config))
}

/// Reads a JSON array of event envelopes.
pub fn load_events(path: &Path) -> Result<Vec<Event>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    Ok(Event::list_from_json(&raw)?)
}
