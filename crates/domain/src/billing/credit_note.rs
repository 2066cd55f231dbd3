//! The credit-note aggregate.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::inventory::InventoryEngine;
use crate::values::{DocumentDates, DocumentLine, Money, ProductId, TaxRate, WarehouseId};

use super::events::{BillingEvent, DocumentEmittedData, DocumentKind, StockChangedData};
use super::invoice::Invoice;
use super::spec::SpecSet;
use super::{DocumentError, DocumentStatus};

/// Policy knobs for credit-note emission, injected at construction.
#[derive(Debug, Clone, Copy)]
pub struct CreditNotePolicy {
    /// How many days after the invoice's issue date a credit note may
    /// still be emitted.
    pub max_window_days: i64,
}

impl Default for CreditNotePolicy {
    fn default() -> Self {
        Self {
            max_window_days: 30,
        }
    }
}

/// A credit note: the only way to correct an emitted invoice.
///
/// Emission returns the credited units to stock as a fresh lot priced at
/// the line's charged value. The referenced invoice is never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreditNote {
    id: Option<AggregateId>,
    status: DocumentStatus,
    customer: String,
    warehouse: Option<WarehouseId>,
    dates: Option<DocumentDates>,
    tax_rate: TaxRate,
    lines: Vec<DocumentLine>,
    subtotal: Money,
    tax: Money,
    grand_total: Money,
    original_invoice: Option<AggregateId>,
    reason: Option<String>,
    movements: Vec<StockChangedData>,
    version: Version,
    #[serde(skip)]
    pending: Vec<BillingEvent>,
}

impl CreditNote {
    /// Starts a new identity-less draft correcting `original_invoice`.
    pub fn draft(
        customer: impl Into<String>,
        warehouse: impl Into<WarehouseId>,
        dates: DocumentDates,
        tax_rate: TaxRate,
        original_invoice: AggregateId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            customer: customer.into(),
            warehouse: Some(warehouse.into()),
            dates: Some(dates),
            tax_rate,
            original_invoice: Some(original_invoice),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Adds a credited line to the draft and recomputes the totals.
    pub fn add_line(&mut self, line: DocumentLine) -> Result<(), DocumentError> {
        if self.status == DocumentStatus::Emitted {
            return Err(DocumentError::AlreadyEmitted);
        }
        if line.quantity == 0 {
            return Err(DocumentError::InvalidLine(format!(
                "quantity must be positive for product {}",
                line.product_id
            )));
        }

        self.lines.push(line);
        self.recompute_totals();
        Ok(())
    }

    /// Validates the draft against the original invoice and the policy,
    /// returns stock, and queues the emission facts.
    #[tracing::instrument(skip(self, engine, original), fields(customer = %self.customer))]
    pub fn finalize(
        &mut self,
        engine: &InventoryEngine,
        original: &Invoice,
        policy: &CreditNotePolicy,
        today: NaiveDate,
    ) -> Result<(), DocumentError> {
        if self.status == DocumentStatus::Emitted {
            return Err(DocumentError::AlreadyEmitted);
        }
        let warehouse = self
            .warehouse
            .clone()
            .ok_or(DocumentError::IncompleteDraft("warehouse"))?;
        let dates = self.dates.ok_or(DocumentError::IncompleteDraft("dates"))?;

        let original_emitted = original.status() == DocumentStatus::Emitted;
        let original_issued = original.dates().map(|d| d.issued_on);
        let max_window_days = policy.max_window_days;

        let mut spec = SpecSet::new()
            .require("credit note has at least one line", |note: &CreditNote| {
                !note.lines.is_empty()
            })
            .require(
                "original invoice must be emitted",
                move |_: &CreditNote| original_emitted,
            )
            .require(
                "issue date must be after the invoice's issue date",
                move |_: &CreditNote| original_issued.is_some_and(|issued| dates.issued_on > issued),
            )
            .require(
                format!("credit note must be issued within {max_window_days} days of the invoice"),
                move |_: &CreditNote| {
                    original_issued.is_some_and(|issued| {
                        (dates.issued_on - issued).num_days() <= max_window_days
                    })
                },
            )
            .require("issue date must not be in the future", move |_: &CreditNote| {
                dates.issued_on <= today
            });

        // Per-product credited quantity may not exceed what the invoice
        // billed.
        let billed = quantities_per_product(original.lines());
        for (product, credited) in quantities_per_product(&self.lines) {
            let billed_qty = billed.get(&product).copied().unwrap_or(0);
            spec = spec.require(
                format!(
                    "credited quantity for {product} exceeds invoiced quantity \
                     ({credited} > {billed_qty})"
                ),
                move |_: &CreditNote| credited <= billed_qty,
            );
        }

        spec.check(self)?;

        // Inbound cannot fail once the key exists; resolving every line's
        // key first keeps emission free of partial stock returns.
        for product in quantities_per_product(&self.lines).keys() {
            engine.stock_level(product, &warehouse)?;
        }

        let document_id = AggregateId::new();
        let mut movements = Vec::new();
        for line in &self.lines {
            // Returned units come back as a fresh lot at the charged value.
            let record = engine.allocate_inbound(
                &line.product_id,
                &warehouse,
                line.quantity,
                line.unit_price,
                dates.issued_on,
                document_id,
            )?;
            movements.push(record);
        }

        let emitted = DocumentEmittedData {
            document_id,
            kind: DocumentKind::CreditNote,
            customer: self.customer.clone(),
            warehouse_id: warehouse,
            lines: self.lines.clone(),
            dates,
            tax_rate: self.tax_rate,
            subtotal: self.subtotal,
            tax: self.tax,
            grand_total: self.grand_total,
            original_invoice: self.original_invoice,
            reason: self.reason.clone(),
            emitted_at: Utc::now(),
        };

        let mut events = vec![BillingEvent::DocumentEmitted(emitted)];
        events.extend(movements.iter().map(|record| {
            BillingEvent::StockChanged(StockChangedData::from_movement(record, dates.issued_on))
        }));

        for event in events {
            self.apply(event.clone());
            self.pending.push(event);
        }

        Ok(())
    }

    fn recompute_totals(&mut self) {
        self.subtotal = self
            .lines
            .iter()
            .fold(Money::zero(), |acc, line| acc + line.total());
        self.tax = self.tax_rate.apply_to(self.subtotal);
        self.grand_total = self.subtotal + self.tax;
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn customer(&self) -> &str {
        &self.customer
    }

    pub fn original_invoice(&self) -> Option<AggregateId> {
        self.original_invoice
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn grand_total(&self) -> Money {
        self.grand_total
    }

    /// The stock movements recorded at emission.
    pub fn movements(&self) -> &[StockChangedData] {
        &self.movements
    }
}

fn quantities_per_product(lines: &[DocumentLine]) -> BTreeMap<ProductId, u64> {
    let mut totals = BTreeMap::new();
    for line in lines {
        *totals.entry(line.product_id.clone()).or_insert(0u64) += line.quantity as u64;
    }
    totals
}

impl Aggregate for CreditNote {
    type Event = BillingEvent;
    type Error = DocumentError;

    fn aggregate_type() -> &'static str {
        "CreditNote"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            BillingEvent::DocumentEmitted(data) => {
                self.id = Some(data.document_id);
                self.status = DocumentStatus::Emitted;
                self.customer = data.customer;
                self.warehouse = Some(data.warehouse_id);
                self.dates = Some(data.dates);
                self.tax_rate = data.tax_rate;
                self.lines = data.lines;
                self.subtotal = data.subtotal;
                self.tax = data.tax;
                self.grand_total = data.grand_total;
                self.original_invoice = data.original_invoice;
                self.reason = data.reason;
            }
            BillingEvent::StockChanged(data) => {
                self.movements.push(data);
            }
        }
    }

    fn pending_events(&self) -> &[Self::Event] {
        &self.pending
    }

    fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

impl SnapshotCapable for CreditNote {}
