//! Cost lots and the per-key lot ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::values::{LotId, Money, ProductId, WarehouseId};

/// The key under which stock is tracked: one product in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub product: ProductId,
    pub warehouse: WarehouseId,
}

impl InventoryKey {
    pub fn new(product: impl Into<ProductId>, warehouse: impl Into<WarehouseId>) -> Self {
        Self {
            product: product.into(),
            warehouse: warehouse.into(),
        }
    }
}

impl std::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.product, self.warehouse)
    }
}

/// A batch of units received together at one unit cost.
///
/// Lots are never deleted; a fully consumed lot stays in the ledger with
/// `remaining == 0` so cost history is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub product: ProductId,
    pub warehouse: WarehouseId,
    pub purchased_on: NaiveDate,
    pub initial: u32,
    pub remaining: u32,
    pub unit_cost: Money,
}

impl Lot {
    /// True once every unit of the lot has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Current stock level for one inventory key.
///
/// Invariant: equals the sum of lot remainders of the same key at every
/// quiescent point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub quantity: u64,
}

/// The ordered lots of a single inventory key.
///
/// Lots are kept in consumption order: ascending purchase date, ties
/// broken by ascending lot id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotLedger {
    lots: Vec<Lot>,
}

impl LotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a lot, keeping the ledger in consumption order.
    pub fn create_lot(&mut self, lot: Lot) {
        let pos = self
            .lots
            .partition_point(|l| (l.purchased_on, l.id) <= (lot.purchased_on, lot.id));
        self.lots.insert(pos, lot);
    }

    /// Lots in consumption order, oldest first.
    pub fn oldest_lots(&mut self) -> impl Iterator<Item = &mut Lot> {
        self.lots.iter_mut()
    }

    /// Read-only view of the lots in consumption order.
    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    /// Total units still available across all lots.
    pub fn total_remaining(&self) -> u64 {
        self.lots.iter().map(|l| l.remaining as u64).sum()
    }
}
