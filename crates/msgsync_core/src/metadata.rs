//! Persisted key/value metadata.
//!
//! The sync cursor lives here as a single key that is overwritten
//! atomically. [`SyncMetadata`] gives typed access to the keys the engine
//! uses and converts store errors into [`CoreFailure`](crate::CoreFailure).

use crate::boundary::{StoreError, StoreResult, StoreResultExt};
use crate::error::CoreResult;
use msgsync_protocol::{ClientId, EventId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Metadata keys.
pub mod keys {
    /// Id of the last processed event.
    pub const LAST_PROCESSED_EVENT_ID: &str = "last_processed_event_id";
    /// Timestamp of the last completed slow sync.
    pub const SLOW_SYNC_COMPLETED_AT: &str = "slow_sync_completed_at";
    /// Set while a history-lost system message still has to be inserted.
    pub const HISTORY_LOST_PENDING: &str = "history_lost_pending";
    /// Client id registered for this device.
    pub const CURRENT_CLIENT_ID: &str = "current_client_id";
    /// Highest applied migration version.
    pub const SCHEMA_VERSION: &str = "schema_version";
}

/// Key/value store with single-key atomic writes.
pub trait MetadataStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes a value. Removing an absent key is a no-op.
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// In-memory metadata store.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    values: Mutex<BTreeMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail until called again with `false`.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    fn check_writable(&self) -> StoreResult<()> {
        if *self.fail_writes.lock() {
            return Err(StoreError::Io(io::Error::other("metadata write refused")));
        }
        Ok(())
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Metadata store persisted as a JSON object in a single file.
///
/// Every write rewrites a temporary file and renames it over the target,
/// so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileMetadataStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileMetadataStore {
    /// Opens the store at `path`, creating it on first write.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> StoreResult<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl MetadataStore for FileMetadataStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut values = self.values.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

/// Typed access to the engine's metadata keys.
#[derive(Clone)]
pub struct SyncMetadata {
    store: Arc<dyn MetadataStore>,
}

impl SyncMetadata {
    /// Wraps a metadata store.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Creates typed access over a fresh in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryMetadataStore::new()))
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Returns the sync cursor.
    pub fn last_processed_event_id(&self) -> CoreResult<Option<EventId>> {
        Ok(self
            .store
            .get(keys::LAST_PROCESSED_EVENT_ID)
            .wrap_storage()?
            .map(EventId::new))
    }

    /// Overwrites the sync cursor.
    pub fn set_last_processed_event_id(&self, id: &EventId) -> CoreResult<()> {
        self.store
            .set(keys::LAST_PROCESSED_EVENT_ID, id.as_str())
            .wrap_storage()
    }

    /// Returns when the last slow sync completed.
    pub fn slow_sync_completed_at(&self) -> CoreResult<Option<String>> {
        self.store.get(keys::SLOW_SYNC_COMPLETED_AT).wrap_storage()
    }

    /// Records slow sync completion.
    pub fn set_slow_sync_completed_at(&self, timestamp: &str) -> CoreResult<()> {
        self.store
            .set(keys::SLOW_SYNC_COMPLETED_AT, timestamp)
            .wrap_storage()
    }

    /// Forgets the last slow sync completion.
    pub fn clear_slow_sync_completion(&self) -> CoreResult<()> {
        self.store.remove(keys::SLOW_SYNC_COMPLETED_AT).wrap_storage()
    }

    /// Returns true while a history-lost message is still owed.
    pub fn history_lost_pending(&self) -> CoreResult<bool> {
        Ok(self
            .store
            .get(keys::HISTORY_LOST_PENDING)
            .wrap_storage()?
            .is_some_and(|value| value == "true"))
    }

    /// Sets or clears the history-lost flag.
    pub fn set_history_lost_pending(&self, pending: bool) -> CoreResult<()> {
        if pending {
            self.store.set(keys::HISTORY_LOST_PENDING, "true").wrap_storage()
        } else {
            self.store.remove(keys::HISTORY_LOST_PENDING).wrap_storage()
        }
    }

    /// Returns the client id registered for this device.
    pub fn current_client_id(&self) -> CoreResult<Option<ClientId>> {
        Ok(self
            .store
            .get(keys::CURRENT_CLIENT_ID)
            .wrap_storage()?
            .map(ClientId::new))
    }

    /// Records the client id registered for this device.
    pub fn set_current_client_id(&self, client: &ClientId) -> CoreResult<()> {
        self.store
            .set(keys::CURRENT_CLIENT_ID, client.as_str())
            .wrap_storage()
    }

    /// Forgets the registered client id.
    pub fn clear_current_client_id(&self) -> CoreResult<()> {
        self.store.remove(keys::CURRENT_CLIENT_ID).wrap_storage()
    }

    /// Returns the applied migration version, 0 when none ran.
    pub fn schema_version(&self) -> CoreResult<u32> {
        let raw = self.store.get(keys::SCHEMA_VERSION).wrap_storage()?;
        Ok(raw.and_then(|value| value.parse().ok()).unwrap_or(0))
    }

    /// Records the applied migration version.
    pub fn set_schema_version(&self, version: u32) -> CoreResult<()> {
        self.store
            .set(keys::SCHEMA_VERSION, &version.to_string())
            .wrap_storage()
    }
}

impl std::fmt::Debug for SyncMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMetadata").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn typed_keys_round_trip_in_memory() {
        let metadata = SyncMetadata::in_memory();
        assert_eq!(metadata.last_processed_event_id().unwrap(), None);
        metadata.set_last_processed_event_id(&EventId::new("0005")).unwrap();
        assert_eq!(
            metadata.last_processed_event_id().unwrap(),
            Some(EventId::new("0005"))
        );

        assert!(!metadata.history_lost_pending().unwrap());
        metadata.set_history_lost_pending(true).unwrap();
        assert!(metadata.history_lost_pending().unwrap());
        metadata.set_history_lost_pending(false).unwrap();
        assert!(!metadata.history_lost_pending().unwrap());

        assert_eq!(metadata.schema_version().unwrap(), 0);
    }

    #[test]
    fn refused_write_is_a_storage_failure() {
        let store = Arc::new(MemoryMetadataStore::new());
        let metadata = SyncMetadata::new(store.clone());
        store.set_fail_writes(true);
        let failure = metadata
            .set_last_processed_event_id(&EventId::new("0001"))
            .unwrap_err();
        assert!(failure.is_transient());
        store.set_fail_writes(false);
        assert_eq!(metadata.last_processed_event_id().unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        {
            let store = FileMetadataStore::open(&path).unwrap();
            store.set(keys::LAST_PROCESSED_EVENT_ID, "0042").unwrap();
            store.set(keys::SLOW_SYNC_COMPLETED_AT, "2024-05-01T10:00:00Z").unwrap();
            store.remove(keys::SLOW_SYNC_COMPLETED_AT).unwrap();
        }
        let reopened = FileMetadataStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(keys::LAST_PROCESSED_EVENT_ID).unwrap().as_deref(),
            Some("0042")
        );
        assert_eq!(reopened.get(keys::SLOW_SYNC_COMPLETED_AT).unwrap(), None);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            FileMetadataStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
