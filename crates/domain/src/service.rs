//! Application service for emitting billing documents.

use std::sync::Arc;

use chrono::NaiveDate;
use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::billing::{
    BillingEvent, CreditNote, CreditNotePolicy, DocumentError, Invoice, StockChangedData,
};
use crate::error::DomainError;
use crate::inventory::InventoryEngine;
use crate::repository::AggregateRepository;
use crate::values::{Money, ProductId, WarehouseId};

/// Coordinates document emission: validation and stock allocation in the
/// aggregates, persistence through the repositories.
///
/// Returns the persisted envelopes alongside the aggregate so callers can
/// hand them to a publisher.
pub struct BillingService<S>
where
    S: EventStore + Clone,
{
    store: S,
    invoices: AggregateRepository<S, Invoice>,
    credit_notes: AggregateRepository<S, CreditNote>,
    engine: Arc<InventoryEngine>,
    policy: CreditNotePolicy,
}

impl<S> BillingService<S>
where
    S: EventStore + Clone,
{
    /// Creates a service with the default credit-note policy.
    pub fn new(store: S, engine: Arc<InventoryEngine>) -> Self {
        Self::with_policy(store, engine, CreditNotePolicy::default())
    }

    /// Creates a service with an explicit credit-note policy.
    pub fn with_policy(store: S, engine: Arc<InventoryEngine>, policy: CreditNotePolicy) -> Self {
        Self {
            invoices: AggregateRepository::new(store.clone()),
            credit_notes: AggregateRepository::new(store.clone()),
            store,
            engine,
            policy,
        }
    }

    /// Records a purchase receipt: a new lot enters the warehouse and the
    /// movement is persisted as a fact, so read models see the same stock
    /// the engine does.
    #[tracing::instrument(skip(self, unit_cost), fields(%product, %warehouse, quantity))]
    pub async fn receive_stock(
        &self,
        product: &ProductId,
        warehouse: &WarehouseId,
        quantity: u32,
        unit_cost: Money,
        received_on: NaiveDate,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let receipt_id = AggregateId::new();
        let record = self.engine.allocate_inbound(
            product,
            warehouse,
            quantity,
            unit_cost,
            received_on,
            receipt_id,
        )?;

        let event = BillingEvent::StockChanged(StockChangedData::from_movement(&record, received_on));
        let envelope = EventEnvelope::builder()
            .aggregate_id(receipt_id)
            .aggregate_type("StockReceipt")
            .event_type(event.event_type())
            .version(Version::first())
            .schema_version(1)
            .payload(&event)?
            .build();

        let envelopes = vec![envelope];
        self.store
            .append(envelopes.clone(), AppendOptions::expect_new())
            .await?;

        metrics::counter!("billing.stock_received").increment(1);
        tracing::info!(receipt_id = %receipt_id, "stock received");
        Ok(envelopes)
    }

    /// The inventory engine backing this service.
    pub fn engine(&self) -> &Arc<InventoryEngine> {
        &self.engine
    }

    /// Finalizes an invoice draft and persists its facts.
    #[tracing::instrument(skip(self, draft), fields(customer = %draft.customer()))]
    pub async fn emit_invoice(
        &self,
        mut draft: Invoice,
        today: NaiveDate,
    ) -> Result<(Invoice, Vec<EventEnvelope>), DomainError> {
        draft.finalize(&self.engine, today)?;
        let envelopes = self.invoices.save(&mut draft).await?;

        metrics::counter!("billing.invoices_emitted").increment(1);
        tracing::info!(
            document_id = %draft.id().unwrap_or_default(),
            total = %draft.grand_total(),
            "invoice emitted"
        );
        Ok((draft, envelopes))
    }

    /// Finalizes a credit-note draft against its original invoice and
    /// persists its facts.
    ///
    /// Fails with `AggregateNotFound` when the referenced invoice has no
    /// stream.
    #[tracing::instrument(skip(self, draft), fields(customer = %draft.customer()))]
    pub async fn emit_credit_note(
        &self,
        mut draft: CreditNote,
        today: NaiveDate,
    ) -> Result<(CreditNote, Vec<EventEnvelope>), DomainError> {
        let original_id = draft
            .original_invoice()
            .ok_or(DocumentError::IncompleteDraft("original invoice"))?;
        let original = self
            .invoices
            .load_existing(original_id)
            .await?
            .ok_or(DomainError::AggregateNotFound {
                aggregate_type: Invoice::aggregate_type(),
                aggregate_id: original_id,
            })?;

        draft.finalize(&self.engine, &original, &self.policy, today)?;
        let envelopes = self.credit_notes.save(&mut draft).await?;

        metrics::counter!("billing.credit_notes_emitted").increment(1);
        tracing::info!(
            document_id = %draft.id().unwrap_or_default(),
            original_invoice = %original_id,
            "credit note emitted"
        );
        Ok((draft, envelopes))
    }

    /// Loads an emitted invoice by id.
    pub async fn invoice(&self, id: AggregateId) -> Result<Option<Invoice>, DomainError> {
        self.invoices.load_existing(id).await
    }

    /// Loads an emitted credit note by id.
    pub async fn credit_note(&self, id: AggregateId) -> Result<Option<CreditNote>, DomainError> {
        self.credit_notes.load_existing(id).await
    }
}
