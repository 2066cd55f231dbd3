use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, Result, Snapshot, Version};

/// Options for appending events to the log.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected version of the aggregate for optimistic concurrency control.
    /// If None, no version check is performed (use with caution).
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the aggregate to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the aggregate to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Append-only event log with snapshot storage.
///
/// Streams are keyed by `(aggregate_id, aggregate_type)`. Version
/// assignment is atomic: an append either claims its versions or fails
/// with `ConcurrencyConflict`, never silently renumbers.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to the log.
    ///
    /// Appends are atomic per call: either every event is recorded or none
    /// is. The version of each event must be unique within its stream; a
    /// clash fails the whole append with `ConcurrencyConflict`. Events
    /// whose `event_id` was already recorded are skipped, so retrying a
    /// failed save cannot double-record facts.
    ///
    /// Returns the version of the stream after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Retrieves all events of one stream, in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves the events of one stream with versions strictly greater
    /// than `after_version`, in version order.
    ///
    /// Used when replaying from a snapshot.
    async fn get_events_for_aggregate_after(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        after_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Streams every event in the log, in insertion order.
    ///
    /// Used by projection catch-up and rebuild.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Gets the current version of a stream.
    ///
    /// Returns None if the stream has no events.
    async fn get_aggregate_version(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Option<Version>>;

    /// Saves a snapshot of an aggregate's state.
    ///
    /// At most one snapshot is kept per stream; an existing one is replaced.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot for a stream.
    ///
    /// Returns None if no snapshot exists.
    async fn get_snapshot(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Option<Snapshot>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event to the log.
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    /// Checks whether a stream has any events.
    async fn aggregate_exists(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<bool> {
        Ok(self
            .get_aggregate_version(aggregate_id, aggregate_type)
            .await?
            .is_some())
    }

    /// Loads a stream for replay: the latest snapshot (if any) plus the
    /// events recorded after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id, aggregate_type).await? {
            let events = self
                .get_events_for_aggregate_after(aggregate_id, aggregate_type, snapshot.version)
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self
                .get_events_for_aggregate(aggregate_id, aggregate_type)
                .await?;
            Ok((None, events))
        }
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Error returned when a batch is not well-formed for appending.
#[derive(Debug, Clone)]
pub struct AppendValidationError {
    pub message: String,
}

impl std::fmt::Display for AppendValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Append validation error: {}", self.message)
    }
}

impl std::error::Error for AppendValidationError {}

/// Validates a batch before appending: non-empty, single stream,
/// consecutive versions.
pub fn validate_events_for_append(
    events: &[EventEnvelope],
) -> std::result::Result<(), AppendValidationError> {
    if events.is_empty() {
        return Err(AppendValidationError {
            message: "Cannot append empty event list".to_string(),
        });
    }

    let first = &events[0];
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(AppendValidationError {
                message: "All events must be for the same aggregate".to_string(),
            });
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(AppendValidationError {
                message: "All events must have the same aggregate type".to_string(),
            });
        }
    }

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(AppendValidationError {
                message: format!(
                    "Event versions must be consecutive. Expected {}, got {}",
                    expected_version, event.version
                ),
            });
        }
    }

    Ok(())
}
