//! FIFO lot-based inventory: ledger, engine, and movement audit trail.

mod engine;
mod lot;
mod movement;

pub use engine::{InventoryEngine, InventoryError};
pub use lot::{InventoryKey, Lot, LotLedger, StockLevel};
pub use movement::{MovementDirection, MovementRecord};
