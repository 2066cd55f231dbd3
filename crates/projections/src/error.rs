//! Errors raised while folding facts into read models.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Reading the fact log failed.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A fact payload did not decode into the expected event shape.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A view rejected a fact for its own reasons.
    #[error("Projection error: {0}")]
    Projection(String),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
