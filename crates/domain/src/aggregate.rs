//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events are immutable facts, named in past tense. Applying one
/// never fails; validation happens before the fact is produced.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// Used for envelope labelling and topic routing.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates in an event-sourced system.
///
/// Aggregates mutate only in memory; every durable change is expressed as
/// an event. New events accumulate in a pending queue until the
/// repository persists them, and the queue is cleared only after a
/// durable append.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    ///
    /// Part of the stream key in the event store.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// None until the aggregate has been finalized; drafts carry no
    /// identity.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the current persisted version of the aggregate.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the repository while replaying and after a save.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be pure and deterministic: same state plus same event always
    /// yields the same new state, no side effects, no failure.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Events produced since the last durable save, oldest first.
    fn pending_events(&self) -> &[Self::Event];

    /// Clears the pending queue.
    ///
    /// The repository calls this once the events are durably appended;
    /// nothing else should.
    fn clear_pending(&mut self);
}

/// Trait for aggregates that support snapshotting.
///
/// Snapshots shorten replay; they never change observable state. An
/// aggregate rebuilt from snapshot plus tail must equal one rebuilt from
/// every event.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Number of versions between snapshots.
    fn snapshot_interval() -> i64 {
        10
    }
}
