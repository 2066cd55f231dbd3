//! The inventory engine: FIFO allocation over per-key lot ledgers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{NaiveDate, Utc};
use common::AggregateId;
use thiserror::Error;

use crate::values::{LotId, Money, ProductId, WarehouseId};

use super::lot::{InventoryKey, Lot, LotLedger, StockLevel};
use super::movement::{MovementDirection, MovementRecord};

/// Errors produced by inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough stock to satisfy an outbound allocation. Nothing was
    /// consumed.
    #[error("Insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: InventoryKey,
        requested: u64,
        available: u64,
    },

    /// The (product, warehouse) key has never been registered.
    #[error("Unknown inventory key: {key}")]
    UnknownInventoryKey { key: InventoryKey },
}

/// Lot ledger and stock level of one key, guarded together.
///
/// Holding one lock over both is what keeps the conservation invariant
/// (stock level == sum of lot remainders) observable at every quiescent
/// point.
#[derive(Debug, Default)]
struct Slot {
    ledger: LotLedger,
    stock: StockLevel,
}

/// FIFO inventory engine.
///
/// One engine instance is shared by every document service; callers
/// receive a handle (`Arc<InventoryEngine>`) at construction. Operations
/// on one key serialize on that key's lock; different keys proceed
/// concurrently.
#[derive(Debug, Default)]
pub struct InventoryEngine {
    slots: RwLock<HashMap<InventoryKey, Arc<Mutex<Slot>>>>,
    lot_seq: AtomicU64,
    journal: Mutex<Vec<MovementRecord>>,
}

impl InventoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a (product, warehouse) key with zero stock.
    ///
    /// Allocation against an unregistered key fails; registration is the
    /// only way a key comes into existence.
    pub fn register(&self, product: impl Into<ProductId>, warehouse: impl Into<WarehouseId>) {
        let key = InventoryKey::new(product, warehouse);
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key).or_default();
    }

    /// Live stock level of a key.
    pub fn stock_level(
        &self,
        product: &ProductId,
        warehouse: &WarehouseId,
    ) -> Result<u64, InventoryError> {
        let slot = self.slot(product, warehouse)?;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.stock.quantity)
    }

    /// Consumes `quantity` units oldest-lot-first on behalf of a document.
    ///
    /// All-or-nothing: if the key cannot cover the full quantity the call
    /// fails with `InsufficientStock` and no lot or stock level changes.
    /// On success returns one record per touched lot, in consumption
    /// order, each priced at that lot's unit cost.
    pub fn allocate_outbound(
        &self,
        product: &ProductId,
        warehouse: &WarehouseId,
        quantity: u32,
        document_id: AggregateId,
    ) -> Result<Vec<MovementRecord>, InventoryError> {
        let mut quantities = BTreeMap::new();
        quantities.insert(product.clone(), quantity as u64);
        self.allocate_outbound_document(warehouse, &quantities, document_id)
    }

    /// Consumes stock for a whole document across several products.
    ///
    /// Every key's lock is taken (in product order) and held for the
    /// duration, and availability is checked for every key before any
    /// decrement: the document consumes everything it needs or nothing
    /// at all, even when a later product is short.
    #[tracing::instrument(skip(self, quantities), fields(%warehouse))]
    pub fn allocate_outbound_document(
        &self,
        warehouse: &WarehouseId,
        quantities: &BTreeMap<ProductId, u64>,
        document_id: AggregateId,
    ) -> Result<Vec<MovementRecord>, InventoryError> {
        let slots = quantities
            .iter()
            .map(|(product, qty)| Ok((product, *qty, self.slot(product, warehouse)?)))
            .collect::<Result<Vec<_>, InventoryError>>()?;

        let mut guards: Vec<(&ProductId, u64, MutexGuard<'_, Slot>)> = slots
            .iter()
            .map(|(product, qty, slot)| {
                (*product, *qty, slot.lock().unwrap_or_else(PoisonError::into_inner))
            })
            .collect();

        for (product, qty, guard) in &guards {
            let available = guard.ledger.total_remaining();
            if *qty > available {
                return Err(InventoryError::InsufficientStock {
                    key: InventoryKey::new((*product).clone(), warehouse.clone()),
                    requested: *qty,
                    available,
                });
            }
        }

        let occurred_at = Utc::now();
        let mut records = Vec::new();

        for (product, qty, guard) in &mut guards {
            let mut outstanding = *qty;
            let mut stock = guard.stock.quantity;

            for lot in guard.ledger.oldest_lots() {
                if outstanding == 0 {
                    break;
                }
                if lot.remaining == 0 {
                    continue;
                }

                let take = (lot.remaining as u64).min(outstanding) as u32;
                lot.remaining -= take;
                outstanding -= take as u64;
                stock -= take as u64;

                records.push(MovementRecord {
                    product: (*product).clone(),
                    warehouse: warehouse.clone(),
                    direction: MovementDirection::Outbound,
                    quantity: take,
                    unit_cost: lot.unit_cost,
                    lot: lot.id,
                    document_id,
                    resulting_stock: stock,
                    occurred_at,
                });
            }

            guard.stock.quantity = stock;
        }
        drop(guards);

        self.record(&records);
        Ok(records)
    }

    /// Receives `quantity` units into a new lot at the given unit cost.
    #[tracing::instrument(skip(self), fields(%product, %warehouse))]
    pub fn allocate_inbound(
        &self,
        product: &ProductId,
        warehouse: &WarehouseId,
        quantity: u32,
        unit_cost: Money,
        purchased_on: NaiveDate,
        document_id: AggregateId,
    ) -> Result<MovementRecord, InventoryError> {
        let slot = self.slot(product, warehouse)?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let lot_id = LotId::new(self.lot_seq.fetch_add(1, Ordering::Relaxed) + 1);
        slot.ledger.create_lot(Lot {
            id: lot_id,
            product: product.clone(),
            warehouse: warehouse.clone(),
            purchased_on,
            initial: quantity,
            remaining: quantity,
            unit_cost,
        });
        slot.stock.quantity += quantity as u64;

        let record = MovementRecord {
            product: product.clone(),
            warehouse: warehouse.clone(),
            direction: MovementDirection::Inbound,
            quantity,
            unit_cost,
            lot: lot_id,
            document_id,
            resulting_stock: slot.stock.quantity,
            occurred_at: Utc::now(),
        };
        drop(slot);

        self.record(std::slice::from_ref(&record));
        Ok(record)
    }

    /// Snapshot of a key's lots in consumption order.
    pub fn lots(
        &self,
        product: &ProductId,
        warehouse: &WarehouseId,
    ) -> Result<Vec<Lot>, InventoryError> {
        let slot = self.slot(product, warehouse)?;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.ledger.lots().to_vec())
    }

    /// The full movement journal, oldest first.
    pub fn journal(&self) -> Vec<MovementRecord> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn slot(
        &self,
        product: &ProductId,
        warehouse: &WarehouseId,
    ) -> Result<Arc<Mutex<Slot>>, InventoryError> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&InventoryKey::new(product.clone(), warehouse.clone()))
            .cloned()
            .ok_or_else(|| InventoryError::UnknownInventoryKey {
                key: InventoryKey::new(product.clone(), warehouse.clone()),
            })
    }

    fn record(&self, records: &[MovementRecord]) {
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        journal.extend_from_slice(records);
    }
}
