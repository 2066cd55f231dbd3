//! Document aggregates: invoices and credit notes.
//!
//! Documents are drafted freely in memory, then finalized exactly once.
//! Finalization validates, allocates inventory, assigns the identity, and
//! queues the resulting facts; a failed finalization leaves no identity
//! and no events.

mod credit_note;
mod events;
mod invoice;
mod spec;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inventory::InventoryError;

pub use credit_note::{CreditNote, CreditNotePolicy};
pub use events::{
    BillingEvent, DocumentEmittedData, DocumentKind, StockChangedData,
};
pub use invoice::Invoice;
pub use spec::SpecSet;

/// Lifecycle of a document aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Mutable, identity-less working state. Draft changes are not events.
    #[default]
    Draft,
    /// Finalized and immutable. Corrections require a credit note.
    Emitted,
}

/// Errors produced by document operations.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// One or more business rules were violated. Carries every violation,
    /// not just the first.
    #[error("Validation failed: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    /// A line with invalid content was rejected before entering the draft.
    #[error("Invalid line: {0}")]
    InvalidLine(String),

    /// The document was already emitted and cannot change.
    #[error("Document already emitted")]
    AlreadyEmitted,

    /// The draft is missing data finalization needs.
    #[error("Draft is incomplete: {0}")]
    IncompleteDraft(&'static str),

    /// An inventory precondition failed outside the validation set.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}
