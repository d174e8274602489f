//! Core configuration.

use crate::boundary::StoreResult;
use crate::metadata::{FileMetadataStore, SyncMetadata};
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for the event store and metadata.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Whether processed events older than the cursor are dropped on commit.
    pub compact_on_commit: bool,

    /// Metadata file; `None` keeps metadata in memory.
    pub metadata_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            compact_on_commit: true,
            metadata_path: None,
        }
    }
}

impl CoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether processed events are compacted on commit.
    #[must_use]
    pub const fn compact_on_commit(mut self, value: bool) -> Self {
        self.compact_on_commit = value;
        self
    }

    /// Persists metadata in the given file.
    #[must_use]
    pub fn metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = Some(path.into());
        self
    }

    /// Opens the configured metadata store.
    pub fn open_metadata(&self) -> StoreResult<SyncMetadata> {
        match &self.metadata_path {
            Some(path) => Ok(SyncMetadata::new(Arc::new(FileMetadataStore::open(path)?))),
            None => Ok(SyncMetadata::in_memory()),
        }
    }
}
