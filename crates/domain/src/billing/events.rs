//! Billing domain events.
//!
//! Both document aggregates emit from the same closed set: one
//! `DocumentEmitted` carrying the frozen commercial content, followed by
//! one `StockChanged` per lot the emission touched.

use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::inventory::{MovementDirection, MovementRecord};
use crate::values::{DocumentDates, DocumentLine, LotId, Money, TaxRate};

/// The kind of commercial document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Invoice,
    CreditNote,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Invoice => write!(f, "Invoice"),
            DocumentKind::CreditNote => write!(f, "CreditNote"),
        }
    }
}

/// Events emitted by the document aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BillingEvent {
    /// A document was emitted: identity assigned, content frozen.
    DocumentEmitted(DocumentEmittedData),

    /// Stock moved as a consequence of an emission. One per touched lot.
    StockChanged(StockChangedData),
}

impl DomainEvent for BillingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BillingEvent::DocumentEmitted(_) => "DocumentEmitted",
            BillingEvent::StockChanged(_) => "StockChanged",
        }
    }
}

/// Data for DocumentEmitted.
///
/// Carries the full frozen content so replay needs nothing outside the
/// stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEmittedData {
    /// The identity assigned at emission.
    pub document_id: AggregateId,

    /// Invoice or credit note.
    pub kind: DocumentKind,

    /// Customer the document is addressed to.
    pub customer: String,

    /// The warehouse the stock moved through.
    pub warehouse_id: crate::values::WarehouseId,

    /// The billed lines, frozen at emission.
    pub lines: Vec<DocumentLine>,

    /// Business dates of the document.
    pub dates: DocumentDates,

    /// Tax rate applied.
    pub tax_rate: TaxRate,

    /// Sum of line totals.
    pub subtotal: Money,

    /// Tax on the subtotal.
    pub tax: Money,

    /// Subtotal plus tax.
    pub grand_total: Money,

    /// For credit notes: the invoice being corrected.
    pub original_invoice: Option<AggregateId>,

    /// For credit notes: why the correction was made.
    pub reason: Option<String>,

    /// When the emission was recorded.
    pub emitted_at: DateTime<Utc>,
}

/// Data for StockChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChangedData {
    /// The document whose emission caused the movement.
    pub document_id: AggregateId,

    pub product_id: crate::values::ProductId,
    pub warehouse_id: crate::values::WarehouseId,
    pub direction: MovementDirection,
    pub quantity: u32,

    /// The touched lot's own unit cost.
    pub unit_cost: Money,
    pub lot: LotId,

    /// Stock level of the key right after the movement.
    pub resulting_stock: u64,

    /// Business date of the movement (lot date for inbound).
    pub movement_date: NaiveDate,
}

impl StockChangedData {
    /// Builds the event data from an engine movement record.
    pub fn from_movement(record: &MovementRecord, movement_date: NaiveDate) -> Self {
        Self {
            document_id: record.document_id,
            product_id: record.product.clone(),
            warehouse_id: record.warehouse.clone(),
            direction: record.direction,
            quantity: record.quantity,
            unit_cost: record.unit_cost,
            lot: record.lot,
            resulting_stock: record.resulting_stock,
            movement_date,
        }
    }
}
