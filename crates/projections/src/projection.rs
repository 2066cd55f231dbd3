//! The projection contract and its delivery-position bookkeeping.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// How far into the fact log a projection has read.
///
/// Positions are compared against the store's event index during catch-up,
/// so a view that already consumed a fact live is not fed it again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_processed: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    /// The position after consuming one more fact.
    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// Consumes billing facts and folds them into a read model.
///
/// Implementations must tolerate at-least-once delivery: the same envelope
/// may arrive once from the live bus and again during catch-up, and must
/// change the view only the first time.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Folds one fact into the view.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops all derived state so a rebuild can replay from scratch.
    async fn reset(&self) -> Result<()>;
}
