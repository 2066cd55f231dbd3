use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Snapshot, Version,
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

/// In-memory event log for tests and examples.
///
/// Mirrors the PostgreSQL implementation: streams keyed by
/// `(aggregate_id, aggregate_type)`, atomic version claims, and
/// deduplication on `event_id`.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    events: Vec<EventEnvelope>,
    seen_ids: HashSet<EventId>,
    snapshots: HashMap<(AggregateId, String), Snapshot>,
}

impl Inner {
    fn stream_version(&self, aggregate_id: AggregateId, aggregate_type: &str) -> Version {
        self.events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.aggregate_type == aggregate_type)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial())
    }
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }

    /// Clears all events and snapshots.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.events.clear();
        inner.seen_ids.clear();
        inner.snapshots.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events).map_err(|e| {
            EventStoreError::Serialization(serde_json::Error::io(std::io::Error::other(e.message)))
        })?;

        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        let mut inner = self.inner.write().await;

        // Skip events already recorded under the same id (retried save).
        let fresh: Vec<_> = events
            .into_iter()
            .filter(|e| !inner.seen_ids.contains(&e.event_id))
            .collect();

        let current_version = inner.stream_version(aggregate_id, &aggregate_type);
        if fresh.is_empty() {
            return Ok(current_version);
        }

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current_version,
            });
        }

        // A version at or below the stream head means another writer
        // claimed the slot first.
        if fresh[0].version <= current_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current_version),
                actual: current_version,
            });
        }

        let last_version = fresh
            .last()
            .map(|e| e.version)
            .unwrap_or(Version::initial());
        for event in fresh {
            inner.seen_ids.insert(event.event_id);
            inner.events.push(event);
        }

        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Vec<EventEnvelope>> {
        let inner = self.inner.read().await;
        let mut events: Vec<_> = inner
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.aggregate_type == aggregate_type)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn get_events_for_aggregate_after(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        after_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let inner = self.inner.read().await;
        let mut events: Vec<_> = inner
            .events
            .iter()
            .filter(|e| {
                e.aggregate_id == aggregate_id
                    && e.aggregate_type == aggregate_type
                    && e.version > after_version
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let inner = self.inner.read().await;
        let events = inner.events.clone();

        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Option<Version>> {
        let inner = self.inner.read().await;
        let version = inner
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.aggregate_type == aggregate_type)
            .map(|e| e.version)
            .max();
        Ok(version)
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut inner = self.inner.write().await;
        let key = (snapshot.aggregate_id, snapshot.aggregate_type.clone());
        inner.snapshots.insert(key, snapshot);
        Ok(())
    }

    async fn get_snapshot(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Option<Snapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .get(&(aggregate_id, aggregate_type.to_string()))
            .cloned())
    }
}
