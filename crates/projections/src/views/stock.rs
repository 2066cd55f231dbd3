//! Stock read model: live stock levels per product and warehouse.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{BillingEvent, MovementDirection, ProductId, WarehouseId};
use event_store::{EventEnvelope, EventId};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Internal state for the stock view.
struct StockState {
    /// Stock level per (product, warehouse).
    levels: HashMap<(ProductId, WarehouseId), i64>,
    /// Ids of events already applied. Delivery is at-least-once, so a
    /// redelivered fact must not move stock twice.
    seen: HashSet<EventId>,
    position: ProjectionPosition,
}

/// Read model view of stock levels, driven by `StockChanged` facts.
///
/// Outbound movements subtract, inbound movements add. Unknown keys read
/// as zero.
#[derive(Clone)]
pub struct StockView {
    state: Arc<RwLock<StockState>>,
}

impl StockView {
    /// Creates a new empty stock view.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StockState {
                levels: HashMap::new(),
                seen: HashSet::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    /// Current stock for one product in one warehouse. Zero when the key
    /// has never moved.
    pub async fn stock_level(&self, product: &ProductId, warehouse: &WarehouseId) -> i64 {
        self.state
            .read()
            .await
            .levels
            .get(&(product.clone(), warehouse.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// All tracked keys with their levels.
    pub async fn all_levels(&self) -> Vec<((ProductId, WarehouseId), i64)> {
        self.state
            .read()
            .await
            .levels
            .iter()
            .map(|(key, level)| (key.clone(), *level))
            .collect()
    }

    /// Stock per warehouse for one product.
    pub async fn levels_for_product(&self, product: &ProductId) -> Vec<(WarehouseId, i64)> {
        self.state
            .read()
            .await
            .levels
            .iter()
            .filter(|((p, _), _)| p == product)
            .map(|((_, w), level)| (w.clone(), *level))
            .collect()
    }
}

impl Default for StockView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for StockView {
    fn name(&self) -> &'static str {
        "StockView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if !state.seen.insert(event.event_id) {
            state.position = state.position.advance();
            return Ok(());
        }

        if event.event_type == "StockChanged"
            && let BillingEvent::StockChanged(data) =
                serde_json::from_value(event.payload.clone())?
        {
            let key = (data.product_id, data.warehouse_id);
            let delta = match data.direction {
                MovementDirection::Outbound => -(data.quantity as i64),
                MovementDirection::Inbound => data.quantity as i64,
            };
            *state.levels.entry(key).or_insert(0) += delta;
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.levels.clear();
        state.seen.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for StockView {
    fn name(&self) -> &'static str {
        "StockView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.levels.len()).unwrap_or(0)
    }
}
