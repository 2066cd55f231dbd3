//! Document summary read model: one row per emitted document.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use domain::{BillingEvent, DocumentKind, Money};
use event_store::{EventEnvelope, EventId};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Denormalized summary of an emitted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub document_id: AggregateId,
    pub kind: DocumentKind,
    pub customer: String,
    pub issued_on: NaiveDate,
    pub line_count: usize,
    pub subtotal: Money,
    pub tax: Money,
    pub grand_total: Money,
    /// For credit notes: the corrected invoice.
    pub original_invoice: Option<AggregateId>,
    pub emitted_at: DateTime<Utc>,
}

struct SummaryState {
    documents: HashMap<AggregateId, DocumentSummary>,
    seen: HashSet<EventId>,
    position: ProjectionPosition,
}

/// Read model view of document headers, driven by `DocumentEmitted` facts.
///
/// Upserts by document id, so a redelivered emission fact converges to
/// the same row.
#[derive(Clone)]
pub struct DocumentSummaryView {
    state: Arc<RwLock<SummaryState>>,
}

impl DocumentSummaryView {
    /// Creates a new empty document summary view.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SummaryState {
                documents: HashMap::new(),
                seen: HashSet::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    /// Gets one document's summary.
    pub async fn get_document(&self, document_id: AggregateId) -> Option<DocumentSummary> {
        self.state.read().await.documents.get(&document_id).cloned()
    }

    /// All documents for one customer, newest emission first.
    pub async fn documents_for_customer(&self, customer: &str) -> Vec<DocumentSummary> {
        let state = self.state.read().await;
        let mut documents: Vec<_> = state
            .documents
            .values()
            .filter(|d| d.customer == customer)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.emitted_at.cmp(&a.emitted_at));
        documents
    }

    /// All documents of one kind.
    pub async fn documents_of_kind(&self, kind: DocumentKind) -> Vec<DocumentSummary> {
        self.state
            .read()
            .await
            .documents
            .values()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }

    /// Credit notes referencing the given invoice.
    pub async fn credit_notes_for_invoice(&self, invoice_id: AggregateId) -> Vec<DocumentSummary> {
        self.state
            .read()
            .await
            .documents
            .values()
            .filter(|d| d.original_invoice == Some(invoice_id))
            .cloned()
            .collect()
    }
}

impl Default for DocumentSummaryView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for DocumentSummaryView {
    fn name(&self) -> &'static str {
        "DocumentSummaryView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if !state.seen.insert(event.event_id) {
            state.position = state.position.advance();
            return Ok(());
        }

        if event.event_type == "DocumentEmitted"
            && let BillingEvent::DocumentEmitted(data) =
                serde_json::from_value(event.payload.clone())?
        {
            state.documents.insert(
                data.document_id,
                DocumentSummary {
                    document_id: data.document_id,
                    kind: data.kind,
                    customer: data.customer,
                    issued_on: data.dates.issued_on,
                    line_count: data.lines.len(),
                    subtotal: data.subtotal,
                    tax: data.tax,
                    grand_total: data.grand_total,
                    original_invoice: data.original_invoice,
                    emitted_at: data.emitted_at,
                },
            );
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.documents.clear();
        state.seen.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for DocumentSummaryView {
    fn name(&self) -> &'static str {
        "DocumentSummaryView"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.documents.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        DocumentDates, DocumentEmittedData, DocumentLine, TaxRate, WarehouseId,
    };
    use event_store::Version;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn emitted(
        document_id: AggregateId,
        kind: DocumentKind,
        customer: &str,
        original_invoice: Option<AggregateId>,
    ) -> BillingEvent {
        BillingEvent::DocumentEmitted(DocumentEmittedData {
            document_id,
            kind,
            customer: customer.to_string(),
            warehouse_id: WarehouseId::new("MAIN"),
            lines: vec![DocumentLine::new(
                "SKU-001",
                "Widget",
                5,
                Money::from_cents(1000),
            )],
            dates: DocumentDates::new(date(1), date(10)),
            tax_rate: TaxRate::from_percent(12),
            subtotal: Money::from_cents(5000),
            tax: Money::from_cents(600),
            grand_total: Money::from_cents(5600),
            original_invoice,
            reason: original_invoice.map(|_| "damaged goods".to_string()),
            emitted_at: Utc::now(),
        })
    }

    fn make_envelope(document_id: AggregateId, event: &BillingEvent) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(document_id)
            .aggregate_type("Invoice")
            .event_type("DocumentEmitted")
            .version(Version::first())
            .payload(event)
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn emission_creates_a_summary_row() {
        let view = DocumentSummaryView::new();
        let id = AggregateId::new();

        view.handle(&make_envelope(id, &emitted(id, DocumentKind::Invoice, "ACME Corp", None)))
            .await
            .unwrap();

        let summary = view.get_document(id).await.unwrap();
        assert_eq!(summary.kind, DocumentKind::Invoice);
        assert_eq!(summary.customer, "ACME Corp");
        assert_eq!(summary.line_count, 1);
        assert_eq!(summary.grand_total.cents(), 5600);
        assert_eq!(summary.issued_on, date(10));
    }

    #[tokio::test]
    async fn redelivery_converges_to_one_row() {
        let view = DocumentSummaryView::new();
        let id = AggregateId::new();
        let envelope = make_envelope(id, &emitted(id, DocumentKind::Invoice, "ACME Corp", None));

        view.handle(&envelope).await.unwrap();
        view.handle(&envelope).await.unwrap();

        assert_eq!(view.count(), 1);
        assert_eq!(view.position().await.events_processed, 2);
    }

    #[tokio::test]
    async fn customer_listing_is_newest_first() {
        let view = DocumentSummaryView::new();
        let first = AggregateId::new();
        let second = AggregateId::new();

        view.handle(&make_envelope(
            first,
            &emitted(first, DocumentKind::Invoice, "ACME Corp", None),
        ))
        .await
        .unwrap();
        view.handle(&make_envelope(
            second,
            &emitted(second, DocumentKind::Invoice, "ACME Corp", None),
        ))
        .await
        .unwrap();

        let documents = view.documents_for_customer("ACME Corp").await;
        assert_eq!(documents.len(), 2);
        assert!(documents[0].emitted_at >= documents[1].emitted_at);
        assert!(view.documents_for_customer("Globex").await.is_empty());
    }

    #[tokio::test]
    async fn credit_notes_link_back_to_their_invoice() {
        let view = DocumentSummaryView::new();
        let invoice_id = AggregateId::new();
        let note_id = AggregateId::new();

        view.handle(&make_envelope(
            invoice_id,
            &emitted(invoice_id, DocumentKind::Invoice, "ACME Corp", None),
        ))
        .await
        .unwrap();
        view.handle(&make_envelope(
            note_id,
            &emitted(note_id, DocumentKind::CreditNote, "ACME Corp", Some(invoice_id)),
        ))
        .await
        .unwrap();

        let notes = view.credit_notes_for_invoice(invoice_id).await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].document_id, note_id);

        let invoices = view.documents_of_kind(DocumentKind::Invoice).await;
        assert_eq!(invoices.len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_all_rows() {
        let view = DocumentSummaryView::new();
        let id = AggregateId::new();
        view.handle(&make_envelope(id, &emitted(id, DocumentKind::Invoice, "ACME Corp", None)))
            .await
            .unwrap();

        view.reset().await.unwrap();
        assert!(view.get_document(id).await.is_none());
        assert_eq!(view.position().await.events_processed, 0);
    }
}
