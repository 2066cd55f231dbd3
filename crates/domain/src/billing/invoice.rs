//! The invoice aggregate.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::inventory::InventoryEngine;
use crate::values::{DocumentDates, DocumentLine, Money, ProductId, TaxRate, WarehouseId};

use super::events::{BillingEvent, DocumentEmittedData, DocumentKind, StockChangedData};
use super::spec::SpecSet;
use super::{DocumentError, DocumentStatus};

/// An invoice: the commercial document that dispatches stock.
///
/// Drafting mutates plain memory; nothing is recorded until `finalize`
/// succeeds, at which point the identity is assigned and the full fact
/// set is queued for persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invoice {
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
    movements: Vec<StockChangedData>,
    version: Version,
    #[serde(skip)]
    pending: Vec<BillingEvent>,
}

impl Invoice {
    /// Starts a new identity-less draft.
    pub fn draft(
        customer: impl Into<String>,
        warehouse: impl Into<WarehouseId>,
        dates: DocumentDates,
        tax_rate: TaxRate,
    ) -> Self {
        Self {
            customer: customer.into(),
            warehouse: Some(warehouse.into()),
            dates: Some(dates),
            tax_rate,
            ..Self::default()
        }
    }

    /// Adds a billed line to the draft and recomputes the totals.
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

    /// Validates the draft, dispatches stock, and queues the emission
    /// facts.
    ///
    /// Every violated rule is reported at once. On any failure the draft
    /// keeps no identity and queues no events.
    #[tracing::instrument(skip(self, engine), fields(customer = %self.customer))]
    pub fn finalize(
        &mut self,
        engine: &InventoryEngine,
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

        let mut spec = SpecSet::new()
            .require("document has at least one line", |inv: &Invoice| {
                !inv.lines.is_empty()
            })
            .require(
                "issue date must not precede authorization date",
                move |_: &Invoice| dates.authorized_on <= dates.issued_on,
            )
            .require("issue date must not be in the future", move |_: &Invoice| {
                dates.issued_on <= today
            })
            .require("expiry date must be after issue date", move |_: &Invoice| {
                dates.expires_on.is_none_or(|exp| exp > dates.issued_on)
            });

        // One live stock read per product; the engine re-checks under its
        // own lock when dispatching.
        for (product, required) in self.required_quantities() {
            let available = engine.stock_level(&product, &warehouse)?;
            spec = spec.require(
                format!(
                    "insufficient stock for {product}: requested {required}, available {available}"
                ),
                move |_: &Invoice| required <= available,
            );
        }

        spec.check(self)?;

        let document_id = AggregateId::new();
        // One document-scoped allocation covering every line: either the
        // whole document dispatches or no lot changes, even when another
        // emission drained a product between validation and here.
        let movements =
            engine.allocate_outbound_document(&warehouse, &self.required_quantities(), document_id)?;

        let emitted = DocumentEmittedData {
            document_id,
            kind: DocumentKind::Invoice,
            customer: self.customer.clone(),
            warehouse_id: warehouse,
            lines: self.lines.clone(),
            dates,
            tax_rate: self.tax_rate,
            subtotal: self.subtotal,
            tax: self.tax,
            grand_total: self.grand_total,
            original_invoice: None,
            reason: None,
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

    /// Total quantity required per product across all lines.
    fn required_quantities(&self) -> BTreeMap<ProductId, u64> {
        let mut required = BTreeMap::new();
        for line in &self.lines {
            *required.entry(line.product_id.clone()).or_insert(0u64) += line.quantity as u64;
        }
        required
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

    pub fn warehouse(&self) -> Option<&WarehouseId> {
        self.warehouse.as_ref()
    }

    pub fn dates(&self) -> Option<DocumentDates> {
        self.dates
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

    /// The stock movements recorded at emission, in consumption order.
    pub fn movements(&self) -> &[StockChangedData] {
        &self.movements
    }
}

impl Aggregate for Invoice {
    type Event = BillingEvent;
    type Error = DocumentError;

    fn aggregate_type() -> &'static str {
        "Invoice"
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

impl SnapshotCapable for Invoice {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::LotId;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn dates() -> DocumentDates {
        DocumentDates::new(date(1), date(10))
    }

    fn stocked_engine() -> InventoryEngine {
        let engine = InventoryEngine::new();
        let product = ProductId::new("SKU-001");
        let warehouse = WarehouseId::new("MAIN");
        engine.register(product.clone(), warehouse.clone());
        engine
            .allocate_inbound(
                &product,
                &warehouse,
                5,
                Money::from_cents(800),
                date(1),
                AggregateId::new(),
            )
            .unwrap();
        engine
            .allocate_inbound(
                &product,
                &warehouse,
                5,
                Money::from_cents(900),
                date(2),
                AggregateId::new(),
            )
            .unwrap();
        engine
    }

    fn draft_with_line(quantity: u32) -> Invoice {
        let mut invoice = Invoice::draft("ACME Corp", "MAIN", dates(), TaxRate::from_percent(12));
        invoice
            .add_line(DocumentLine::new(
                "SKU-001",
                "Widget",
                quantity,
                Money::from_cents(1000),
            ))
            .unwrap();
        invoice
    }

    #[test]
    fn draft_recomputes_totals_per_line() {
        let mut invoice = Invoice::draft("ACME Corp", "MAIN", dates(), TaxRate::from_percent(12));
        invoice
            .add_line(DocumentLine::new(
                "SKU-001",
                "Widget",
                2,
                Money::from_cents(1000),
            ))
            .unwrap();
        invoice
            .add_line(DocumentLine::new(
                "SKU-002",
                "Gadget",
                1,
                Money::from_cents(500),
            ))
            .unwrap();

        assert_eq!(invoice.subtotal().cents(), 2500);
        assert_eq!(invoice.tax().cents(), 300);
        assert_eq!(invoice.grand_total().cents(), 2800);
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let mut invoice = Invoice::draft("ACME Corp", "MAIN", dates(), TaxRate::default());
        let err = invoice
            .add_line(DocumentLine::new(
                "SKU-001",
                "Widget",
                0,
                Money::from_cents(1000),
            ))
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidLine(_)));
        assert!(invoice.lines().is_empty());
    }

    #[test]
    fn finalize_emits_document_then_stock_facts() {
        let engine = stocked_engine();
        let mut invoice = draft_with_line(7);

        invoice.finalize(&engine, date(15)).unwrap();

        assert_eq!(invoice.status(), DocumentStatus::Emitted);
        assert!(invoice.id().is_some());

        let pending = invoice.pending_events();
        assert_eq!(pending.len(), 3);
        assert!(matches!(pending[0], BillingEvent::DocumentEmitted(_)));
        assert!(matches!(pending[1], BillingEvent::StockChanged(_)));
        assert!(matches!(pending[2], BillingEvent::StockChanged(_)));

        // FIFO cost attribution carried on the facts.
        let movements = invoice.movements();
        assert_eq!(movements[0].quantity, 5);
        assert_eq!(movements[0].unit_cost, Money::from_cents(800));
        assert_eq!(movements[0].lot, LotId::new(1));
        assert_eq!(movements[1].quantity, 2);
        assert_eq!(movements[1].unit_cost, Money::from_cents(900));

        let product = ProductId::new("SKU-001");
        let warehouse = WarehouseId::new("MAIN");
        assert_eq!(engine.stock_level(&product, &warehouse).unwrap(), 3);
    }

    #[test]
    fn failed_finalize_keeps_no_identity_and_no_events() {
        let engine = stocked_engine();
        let mut invoice = draft_with_line(11);

        let err = invoice.finalize(&engine, date(15)).unwrap_err();
        match err {
            DocumentError::Validation { violations } => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].contains("insufficient stock"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(invoice.status(), DocumentStatus::Draft);
        assert!(invoice.id().is_none());
        assert!(invoice.pending_events().is_empty());

        // Stock untouched.
        let product = ProductId::new("SKU-001");
        let warehouse = WarehouseId::new("MAIN");
        assert_eq!(engine.stock_level(&product, &warehouse).unwrap(), 10);
    }

    #[test]
    fn all_violations_reported_together() {
        let engine = stocked_engine();
        // Issued before authorization, in the future, and over stock.
        let bad_dates = DocumentDates::new(date(10), date(5)).with_expiry(date(2));
        let mut invoice = Invoice::draft("ACME Corp", "MAIN", bad_dates, TaxRate::default());
        invoice
            .add_line(DocumentLine::new(
                "SKU-001",
                "Widget",
                20,
                Money::from_cents(1000),
            ))
            .unwrap();

        let err = invoice.finalize(&engine, date(1)).unwrap_err();
        match err {
            DocumentError::Validation { violations } => {
                assert_eq!(violations.len(), 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn finalize_dispatches_every_product_of_the_document() {
        let engine = stocked_engine();
        let gadget = ProductId::new("SKU-002");
        let warehouse = WarehouseId::new("MAIN");
        engine.register(gadget.clone(), warehouse.clone());
        engine
            .allocate_inbound(
                &gadget,
                &warehouse,
                4,
                Money::from_cents(250),
                date(1),
                AggregateId::new(),
            )
            .unwrap();

        let mut invoice = draft_with_line(2);
        invoice
            .add_line(DocumentLine::new(
                "SKU-002",
                "Gadget",
                3,
                Money::from_cents(300),
            ))
            .unwrap();

        invoice.finalize(&engine, date(15)).unwrap();

        let products: Vec<_> = invoice
            .movements()
            .iter()
            .map(|m| m.product_id.clone())
            .collect();
        assert!(products.contains(&ProductId::new("SKU-001")));
        assert!(products.contains(&gadget));
        assert_eq!(engine.stock_level(&gadget, &warehouse).unwrap(), 1);
    }

    #[test]
    fn finalize_twice_is_rejected() {
        let engine = stocked_engine();
        let mut invoice = draft_with_line(2);
        invoice.finalize(&engine, date(15)).unwrap();

        let err = invoice.finalize(&engine, date(15)).unwrap_err();
        assert!(matches!(err, DocumentError::AlreadyEmitted));
    }

    #[test]
    fn lines_cannot_change_after_emission() {
        let engine = stocked_engine();
        let mut invoice = draft_with_line(2);
        invoice.finalize(&engine, date(15)).unwrap();

        let err = invoice
            .add_line(DocumentLine::new(
                "SKU-001",
                "Widget",
                1,
                Money::from_cents(1000),
            ))
            .unwrap_err();
        assert!(matches!(err, DocumentError::AlreadyEmitted));
    }

    #[test]
    fn unknown_warehouse_surfaces_inventory_error() {
        let engine = InventoryEngine::new();
        let mut invoice = draft_with_line(1);

        let err = invoice.finalize(&engine, date(15)).unwrap_err();
        assert!(matches!(err, DocumentError::Inventory(_)));
        assert!(invoice.pending_events().is_empty());
    }

    #[test]
    fn replaying_the_facts_rebuilds_the_emitted_state() {
        let engine = stocked_engine();
        let mut invoice = draft_with_line(7);
        invoice.finalize(&engine, date(15)).unwrap();

        let mut replayed = Invoice::default();
        replayed.apply_events(invoice.pending_events().to_vec());

        assert_eq!(replayed.id(), invoice.id());
        assert_eq!(replayed.status(), DocumentStatus::Emitted);
        assert_eq!(replayed.grand_total(), invoice.grand_total());
        assert_eq!(replayed.movements().len(), invoice.movements().len());
    }
}
