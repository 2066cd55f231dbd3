//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::billing::DocumentError;
use crate::inventory::InventoryError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A document operation was rejected.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// An inventory operation was rejected.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// Pending events were offered for an aggregate that never gained an
    /// identity.
    #[error("Cannot save {aggregate_type}: aggregate has no identity")]
    MissingIdentity { aggregate_type: &'static str },

    /// A save kept conflicting with concurrent writers after retrying.
    #[error("Concurrent writes exhausted {attempts} save attempts for {aggregate_id}")]
    SaveContention {
        aggregate_id: AggregateId,
        attempts: u32,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
