//! Event store.
//!
//! Keeps inbound events keyed by id and exposes the unprocessed ones in id
//! order, regardless of arrival order. The store is the only writer of the
//! sync cursor: [`EventStore::commit_processed`] marks an event processed
//! and advances the cursor under one lock, so a step is either fully
//! committed or looks as if it never ran.

use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::metadata::SyncMetadata;
use futures::Stream;
use msgsync_protocol::{Event, EventId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

struct Inner {
    events: RwLock<BTreeMap<EventId, Event>>,
    changes: watch::Sender<u64>,
    metadata: SyncMetadata,
    compact_on_commit: bool,
}

/// Store of inbound events.
///
/// Cloning is cheap; clones share the same events.
#[derive(Clone)]
pub struct EventStore {
    inner: Arc<Inner>,
}

impl EventStore {
    /// Creates an empty store writing its cursor to `metadata`.
    pub fn new(metadata: SyncMetadata, config: &CoreConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                events: RwLock::new(BTreeMap::new()),
                changes,
                metadata,
                compact_on_commit: config.compact_on_commit,
            }),
        }
    }

    /// Creates an empty store with in-memory metadata and default settings.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(SyncMetadata::in_memory(), &CoreConfig::default())
    }

    /// Returns the metadata this store writes its cursor to.
    #[must_use]
    pub fn metadata(&self) -> &SyncMetadata {
        &self.inner.metadata
    }

    /// Inserts a batch of events.
    ///
    /// Events whose id is already stored are skipped; the stored copy,
    /// including its processed flag, is kept. Returns how many were new.
    pub fn insert_events(&self, batch: impl IntoIterator<Item = Event>) -> CoreResult<usize> {
        let mut inserted = 0;
        {
            let mut events = self.inner.events.write();
            for event in batch {
                if events.contains_key(&event.id) {
                    tracing::trace!(event_id = %event.id.obfuscated(), "duplicate event skipped");
                    continue;
                }
                events.insert(event.id.clone(), event);
                inserted += 1;
            }
        }
        if inserted > 0 {
            self.notify();
        }
        Ok(inserted)
    }

    /// Returns an endless stream of unprocessed events, lowest id first.
    ///
    /// The stream yields the lowest unprocessed event each time it is
    /// polled, so an event that is not marked processed before the next poll
    /// is yielded again. When nothing is pending it waits for the next insert.
    pub fn observe_unprocessed_events(&self) -> impl Stream<Item = Event> + Send + 'static {
        let store = self.clone();
        let changes = self.inner.changes.subscribe();
        futures::stream::unfold((store, changes), |(store, mut changes)| async move {
            loop {
                changes.borrow_and_update();
                if let Some(event) = store.first_unprocessed() {
                    return Some((event, (store, changes)));
                }
                if changes.changed().await.is_err() {
                    return None;
                }
            }
        })
    }

    /// Marks an event processed without touching the cursor. No-op if absent.
    pub fn mark_event_as_processed(&self, id: &EventId) -> CoreResult<()> {
        let marked = match self.inner.events.write().get_mut(id) {
            Some(event) => {
                event.processed = true;
                true
            }
            None => false,
        };
        if marked {
            self.notify();
        }
        Ok(())
    }

    /// Marks `event` processed and, unless it is transient, advances the
    /// cursor to its id.
    ///
    /// The cursor write happens first; if it fails the event stays
    /// unprocessed. The cursor never moves backwards.
    pub fn commit_processed(&self, event: &Event) -> CoreResult<()> {
        {
            let mut events = self.inner.events.write();
            if !event.transient {
                let current = self.inner.metadata.last_processed_event_id()?;
                if current.as_ref().map_or(true, |cursor| event.id > *cursor) {
                    self.inner.metadata.set_last_processed_event_id(&event.id)?;
                }
            }
            if let Some(stored) = events.get_mut(&event.id) {
                stored.processed = true;
            }
            if self.inner.compact_on_commit && !event.transient {
                events.retain(|id, stored| !(stored.processed && *id < event.id));
            }
        }
        self.notify();
        Ok(())
    }

    /// Deletes every processed event. Returns how many were deleted.
    pub fn delete_all_processed_events(&self) -> CoreResult<usize> {
        let mut events = self.inner.events.write();
        let before = events.len();
        events.retain(|_, event| !event.processed);
        Ok(before - events.len())
    }

    /// Deletes processed events with an id lower than `cursor`.
    pub fn delete_processed_events_before(&self, cursor: &EventId) -> CoreResult<usize> {
        let mut events = self.inner.events.write();
        let before = events.len();
        events.retain(|id, event| !(event.processed && id < cursor));
        Ok(before - events.len())
    }

    /// Returns an event, or `None` if absent.
    pub fn get_event_by_id(&self, id: &EventId) -> CoreResult<Option<Event>> {
        Ok(self.inner.events.read().get(id).cloned())
    }

    /// Returns the lowest-id unprocessed event.
    #[must_use]
    pub fn first_unprocessed(&self) -> Option<Event> {
        self.inner
            .events
            .read()
            .values()
            .find(|event| !event.processed)
            .cloned()
    }

    /// Returns the highest unprocessed id.
    #[must_use]
    pub fn last_unprocessed_id(&self) -> Option<EventId> {
        self.inner
            .events
            .read()
            .values()
            .rev()
            .find(|event| !event.processed)
            .map(|event| event.id.clone())
    }

    /// Returns the highest processed id.
    #[must_use]
    pub fn latest_processed_id(&self) -> Option<EventId> {
        self.inner
            .events
            .read()
            .values()
            .rev()
            .find(|event| event.processed)
            .map(|event| event.id.clone())
    }

    /// Returns the number of unprocessed events.
    #[must_use]
    pub fn unprocessed_count(&self) -> usize {
        self.inner
            .events
            .read()
            .values()
            .filter(|event| !event.processed)
            .count()
    }

    /// Returns the number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.events.read().len()
    }

    /// Returns true if no events are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every stored event in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.events.read().values().cloned().collect()
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("events", &self.len())
            .field("compact_on_commit", &self.inner.compact_on_commit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;
    use futures::StreamExt;
    use msgsync_protocol::{DomainEvent, FederationEvent};
    use std::pin::pin;
    use std::time::Duration;

    fn event(id: &str) -> Event {
        Event::new(
            id,
            DomainEvent::Federation(FederationEvent::Delete {
                domain: format!("{id}.example"),
            }),
        )
    }

    fn store_without_compaction() -> EventStore {
        EventStore::new(SyncMetadata::in_memory(), &CoreConfig::new().compact_on_commit(false))
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let store = store_without_compaction();
        assert_eq!(store.insert_events(vec![event("0001")]).unwrap(), 1);
        store.commit_processed(&event("0001")).unwrap();

        let mut refetched = event("0001");
        refetched.payload = DomainEvent::MissedNotifications;
        assert_eq!(store.insert_events(vec![refetched]).unwrap(), 0);

        assert_eq!(store.len(), 1);
        let stored = store.get_event_by_id(&EventId::new("0001")).unwrap().unwrap();
        assert!(stored.processed);
        assert!(matches!(stored.payload, DomainEvent::Federation(_)));
    }

    proptest::proptest! {
        #[test]
        fn shuffled_duplicate_batches_store_each_id_once(
            ids in proptest::collection::vec(0u32..500, 1..40)
        ) {
            let store = store_without_compaction();
            let batch: Vec<Event> = ids.iter().map(|n| event(&format!("{n:04}"))).collect();
            store.insert_events(batch.clone()).unwrap();
            store.insert_events(batch.into_iter().rev()).unwrap();

            let mut expected: Vec<String> = ids.iter().map(|n| format!("{n:04}")).collect();
            expected.sort();
            expected.dedup();
            let stored: Vec<String> = store
                .snapshot()
                .iter()
                .map(|event| event.id.as_str().to_string())
                .collect();
            proptest::prop_assert_eq!(stored, expected);
        }
    }

    #[test]
    fn unprocessed_events_are_exposed_in_id_order() {
        let store = EventStore::in_memory();
        store
            .insert_events(vec![event("0002"), event("0003"), event("0001")])
            .unwrap();
        assert_eq!(store.first_unprocessed().unwrap().id.as_str(), "0001");
        assert_eq!(store.last_unprocessed_id().unwrap().as_str(), "0003");
    }

    #[test]
    fn missing_event_is_none() {
        let store = EventStore::in_memory();
        assert!(store.get_event_by_id(&EventId::new("nope")).unwrap().is_none());
        store.mark_event_as_processed(&EventId::new("nope")).unwrap();
    }

    #[test]
    fn transient_events_do_not_move_cursor() {
        let store = EventStore::in_memory();
        let transient = event("0001").transient();
        store.insert_events(vec![transient.clone()]).unwrap();
        store.commit_processed(&transient).unwrap();
        assert_eq!(store.metadata().last_processed_event_id().unwrap(), None);
        assert_eq!(store.unprocessed_count(), 0);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let store = store_without_compaction();
        store.insert_events(vec![event("0005"), event("0003")]).unwrap();
        store.commit_processed(&event("0005")).unwrap();
        store.commit_processed(&event("0003")).unwrap();
        assert_eq!(
            store.metadata().last_processed_event_id().unwrap(),
            Some(EventId::new("0005"))
        );
    }

    #[test]
    fn failed_cursor_write_leaves_event_unprocessed() {
        let raw = Arc::new(MemoryMetadataStore::new());
        let store = EventStore::new(SyncMetadata::new(raw.clone()), &CoreConfig::default());
        store.insert_events(vec![event("0001")]).unwrap();
        raw.set_fail_writes(true);
        assert!(store.commit_processed(&event("0001")).is_err());
        assert_eq!(store.first_unprocessed().unwrap().id.as_str(), "0001");
    }

    #[test]
    fn compaction_never_deletes_unprocessed() {
        let store = store_without_compaction();
        store
            .insert_events(vec![event("0001"), event("0002"), event("0003")])
            .unwrap();
        store.mark_event_as_processed(&EventId::new("0001")).unwrap();
        store.mark_event_as_processed(&EventId::new("0003")).unwrap();

        assert_eq!(
            store
                .delete_processed_events_before(&EventId::new("0003"))
                .unwrap(),
            1
        );
        assert!(store.get_event_by_id(&EventId::new("0002")).unwrap().is_some());
        assert_eq!(store.delete_all_processed_events().unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.first_unprocessed().unwrap().id.as_str(), "0002");
    }

    #[test]
    fn commit_compacts_superseded_events() {
        let store = EventStore::in_memory();
        store
            .insert_events(vec![event("0001"), event("0002"), event("0003")])
            .unwrap();
        store.commit_processed(&event("0001")).unwrap();
        store.commit_processed(&event("0002")).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.latest_processed_id().unwrap().as_str(), "0002");
    }

    #[tokio::test]
    async fn stream_waits_for_late_inserts() {
        let store = EventStore::in_memory();
        let mut stream = pin!(store.observe_unprocessed_events());

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.insert_events(vec![event("0002"), event("0001")]).unwrap();
        });

        let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id.as_str(), "0001");

        // Not committed yet: the same event comes back.
        let again = stream.next().await.unwrap();
        assert_eq!(again.id.as_str(), "0001");

        store.commit_processed(&again).unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(second.id.as_str(), "0002");
    }
}
