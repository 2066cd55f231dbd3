//! Query facade over the read models.

use common::AggregateId;
use domain::{DocumentKind, ProductId, WarehouseId};

use crate::views::{DocumentSummary, DocumentSummaryView, StockView};

/// Read-side entry point: answers queries from the views, never from the
/// event store.
#[derive(Clone)]
pub struct QueryService {
    stock: StockView,
    documents: DocumentSummaryView,
}

impl QueryService {
    pub fn new(stock: StockView, documents: DocumentSummaryView) -> Self {
        Self { stock, documents }
    }

    /// Stock level for one product in one warehouse. A key with no
    /// recorded movement reads as zero.
    pub async fn stock_level(&self, product: &ProductId, warehouse: &WarehouseId) -> i64 {
        self.stock.stock_level(product, warehouse).await
    }

    /// Stock per warehouse for one product.
    pub async fn stock_for_product(&self, product: &ProductId) -> Vec<(WarehouseId, i64)> {
        self.stock.levels_for_product(product).await
    }

    /// One document's summary, if it has been projected.
    pub async fn document(&self, document_id: AggregateId) -> Option<DocumentSummary> {
        self.documents.get_document(document_id).await
    }

    /// Documents for a customer, newest first.
    pub async fn documents_for_customer(&self, customer: &str) -> Vec<DocumentSummary> {
        self.documents.documents_for_customer(customer).await
    }

    /// Documents of one kind.
    pub async fn documents_of_kind(&self, kind: DocumentKind) -> Vec<DocumentSummary> {
        self.documents.documents_of_kind(kind).await
    }

    /// Credit notes referencing an invoice.
    pub async fn credit_notes_for_invoice(&self, invoice_id: AggregateId) -> Vec<DocumentSummary> {
        self.documents.credit_notes_for_invoice(invoice_id).await
    }
}
