//! Inspect command implementation.

use msgsync_core::SyncMetadata;
use serde::Serialize;
use std::path::Path;

/// Persisted sync metadata of one account.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InspectResult {
    /// Metadata file.
    pub path: String,
    /// Sync cursor.
    pub last_processed_event_id: Option<String>,
    /// Time of the last completed slow sync.
    pub slow_sync_completed_at: Option<String>,
    /// Whether a history-lost message is due.
    pub history_lost_pending: bool,
    /// Registered client.
    pub current_client_id: Option<String>,
    /// Applied migration version.
    pub schema_version: u32,
}

/// Reads the metadata at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No metadata found at {}", path.display()).into());
    }
    let events = super::open_store(path)?;
    let metadata: &SyncMetadata = events.metadata();
    Ok(InspectResult {
        path: path.display().to_string(),
        last_processed_event_id: metadata
            .last_processed_event_id()?
            .map(|id| id.as_str().to_string()),
        slow_sync_completed_at: metadata.slow_sync_completed_at()?,
        history_lost_pending: metadata.history_lost_pending()?,
        current_client_id: metadata
            .current_client_id()?
            .map(|client| client.as_str().to_string()),
        schema_version: metadata.schema_version()?,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            let missing = || "-".to_string();
            println!("Sync Metadata");
            println!("=============");
            println!("  Path:              {}", result.path);
            println!(
                "  Cursor:            {}",
                result.last_processed_event_id.clone().unwrap_or_else(missing)
            );
            println!(
                "  Slow sync at:      {}",
                result.slow_sync_completed_at.clone().unwrap_or_else(missing)
            );
            println!("  History lost:      {}", result.history_lost_pending);
            println!(
                "  Client:            {}",
                result.current_client_id.clone().unwrap_or_else(missing)
            );
            println!("  Schema version:    {}", result.schema_version);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgsync_protocol::{ClientId, EventId};
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(inspect(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn reads_written_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.json");
        {
            let events = super::super::open_store(&path).unwrap();
            let metadata = events.metadata();
            metadata.set_last_processed_event_id(&EventId::new("0042")).unwrap();
            metadata.set_current_client_id(&ClientId::new("device")).unwrap();
        }

        let result = inspect(&path).unwrap();
        assert_eq!(result.last_processed_event_id.as_deref(), Some("0042"));
        assert_eq!(result.current_client_id.as_deref(), Some("device"));
        assert_eq!(result.slow_sync_completed_at, None);
        assert!(!result.history_lost_pending);
    }
}
