//! Query-side access to denormalized view state.

/// A denormalized view answering queries without touching the event log.
///
/// Views implement this alongside [`crate::Projection`]; the projection
/// side writes, this side reads.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of entries currently held, for monitoring and tests.
    fn count(&self) -> usize;
}
