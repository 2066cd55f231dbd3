//! Aggregate persistence on top of the event store.
//!
//! The repository owns the replay and save mechanics: load restores a
//! snapshot (when one exists) and applies the tail, save turns the
//! aggregate's pending queue into envelopes and appends them with
//! optimistic concurrency.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreError, EventStoreExt, Snapshot, Version,
};

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// How many times a save retries after a version conflict before giving up.
const MAX_SAVE_ATTEMPTS: u32 = 3;

/// Event-sourced repository for one aggregate type.
pub struct AggregateRepository<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> AggregateRepository<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Creates a repository backed by the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate by replaying its stream.
    ///
    /// Starts from the latest snapshot when one exists, then applies the
    /// tail. A stream with no events yields the default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self
            .store
            .load_aggregate(aggregate_id, A::aggregate_type())
            .await?;

        let mut aggregate = if let Some(snapshot) = snapshot {
            let restored: A = serde_json::from_value(snapshot.state)?;
            restored
        } else {
            A::default()
        };

        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if its stream has no events.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Persists the aggregate's pending events.
    ///
    /// The append carries the aggregate's persisted version as the
    /// expected version. On a conflict the stream version is re-read and
    /// the append retried with renumbered envelopes, a bounded number of
    /// times. The pending queue is cleared only once the append is
    /// durable, so a failed save can simply be retried.
    ///
    /// Returns the envelopes that were appended, for publication.
    #[tracing::instrument(skip(self, aggregate), fields(aggregate_type = A::aggregate_type()))]
    pub async fn save(&self, aggregate: &mut A) -> Result<Vec<EventEnvelope>, DomainError> {
        let pending = aggregate.pending_events().to_vec();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let aggregate_id = aggregate.id().ok_or(DomainError::MissingIdentity {
            aggregate_type: A::aggregate_type(),
        })?;

        let mut base_version = aggregate.version();
        let mut attempt = 1;
        let (envelopes, new_version) = loop {
            let envelopes = build_envelopes::<A>(aggregate_id, base_version, &pending)?;
            let options = if base_version == Version::initial() {
                AppendOptions::expect_new()
            } else {
                AppendOptions::expect_version(base_version)
            };

            match self.store.append(envelopes.clone(), options).await {
                Ok(new_version) => break (envelopes, new_version),
                Err(EventStoreError::ConcurrencyConflict { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    attempt += 1;
                    base_version = self
                        .store
                        .get_aggregate_version(aggregate_id, A::aggregate_type())
                        .await?
                        .unwrap_or_else(Version::initial);
                }
                Err(EventStoreError::ConcurrencyConflict { .. }) => {
                    return Err(DomainError::SaveContention {
                        aggregate_id,
                        attempts: attempt,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        };

        aggregate.set_version(new_version);
        aggregate.clear_pending();

        self.maybe_snapshot(aggregate, aggregate_id, new_version)
            .await?;

        metrics::counter!("repository.events_saved").increment(envelopes.len() as u64);
        Ok(envelopes)
    }

    /// Saves a snapshot when the stream has grown past the interval since
    /// the last one.
    async fn maybe_snapshot(
        &self,
        aggregate: &A,
        aggregate_id: AggregateId,
        new_version: Version,
    ) -> Result<(), DomainError> {
        let last_snapshot_version = self
            .store
            .get_snapshot(aggregate_id, A::aggregate_type())
            .await?
            .map(|snapshot| snapshot.version.as_i64())
            .unwrap_or(0);

        if new_version.as_i64() - last_snapshot_version >= A::snapshot_interval() {
            let snapshot =
                Snapshot::from_state(aggregate_id, A::aggregate_type(), new_version, aggregate)?;
            self.store.save_snapshot(snapshot).await?;
        }

        Ok(())
    }
}

/// Builds envelopes for a run of pending events, numbering from the
/// version after `base_version`.
fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    base_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = base_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .schema_version(1)
            .payload(event)?
            .build();
        envelopes.push(envelope);
    }

    Ok(envelopes)
}
