//! Movement records: the audit trail of every lot touch.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::values::{LotId, Money, ProductId, WarehouseId};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementDirection {
    /// Stock leaving the warehouse (invoice dispatch).
    Outbound,
    /// Stock entering the warehouse (receipt or credit-note return).
    Inbound,
}

impl std::fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovementDirection::Outbound => write!(f, "OUT"),
            MovementDirection::Inbound => write!(f, "IN"),
        }
    }
}

/// One lot touch: quantity moved at the lot's own unit cost.
///
/// An outbound allocation that spans several lots produces one record per
/// lot, each carrying that lot's cost. Cost attribution is never
/// averaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub product: ProductId,
    pub warehouse: WarehouseId,
    pub direction: MovementDirection,
    pub quantity: u32,
    /// The touched lot's unit cost.
    pub unit_cost: Money,
    pub lot: LotId,
    /// The document whose emission caused this movement.
    pub document_id: AggregateId,
    /// Stock level of the key right after this movement.
    pub resulting_stock: u64,
    pub occurred_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Total cost of this movement (quantity * lot unit cost).
    pub fn total_cost(&self) -> Money {
        self.unit_cost.multiply(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::LotId;

    #[test]
    fn total_cost_uses_lot_unit_cost() {
        let record = MovementRecord {
            product: ProductId::new("SKU-001"),
            warehouse: WarehouseId::new("MAIN"),
            direction: MovementDirection::Outbound,
            quantity: 5,
            unit_cost: Money::from_cents(800),
            lot: LotId::new(1),
            document_id: AggregateId::new(),
            resulting_stock: 3,
            occurred_at: Utc::now(),
        };
        assert_eq!(record.total_cost().cents(), 4000);
    }

    #[test]
    fn direction_display() {
        assert_eq!(MovementDirection::Outbound.to_string(), "OUT");
        assert_eq!(MovementDirection::Inbound.to_string(), "IN");
    }
}
