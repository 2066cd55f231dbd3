//! Append-only event log with snapshots.
//!
//! Streams are keyed by `(aggregate_id, aggregate_type)`; versions within
//! a stream are claimed atomically, so concurrent writers cannot
//! interleave. Two implementations are provided: [`InMemoryEventStore`]
//! for tests and [`PostgresEventStore`] for durable storage.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, SCHEMA_VERSION_KEY, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
