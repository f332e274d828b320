use chrono::{DateTime, Utc};

use crate::{
    db_types::{Actor, NewOrder, Order, OrderCode, OrderItem, StatusHistoryEntry, StockKey, StockMovement},
    errors::EngineError,
    traits::data_objects::{StatusChange, StockLedgerReport, TransitionResult},
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// The backend's clock. Every timestamp it writes is taken from here.
    fn now(&self) -> DateTime<Utc>;

    /// Creates the order, its items and one RESERVE movement per line in a single transaction. Item prices and names
    /// are snapshotted from the catalog. Fails with `InsufficientStock` without writing anything if any line cannot be
    /// reserved. The order code is regenerated on collision.
    async fn create_order(&self, order: NewOrder, actor: &Actor) -> Result<(Order, Vec<OrderItem>), EngineError>;

    async fn fetch_order(&self, code: &OrderCode) -> Result<Option<Order>, EngineError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, EngineError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, EngineError>;

    /// Moves the order along one state-machine edge under the order lock, writing the transition timestamp and a
    /// history row. Entering CANCELLED, FAILED or EXPIRED restores reserved stock and closes any open payment.
    async fn transition_order(&self, code: &OrderCode, change: StatusChange) -> Result<TransitionResult, EngineError>;

    /// Writes the tracking number. Only allowed while the order is PAID or PACKING.
    async fn set_resi(&self, code: &OrderCode, resi: &str, actor: &Actor) -> Result<Order, EngineError>;

    /// Writes the tracking number and moves the order to SHIPPED in one transaction.
    async fn ship_with_resi(&self, code: &OrderCode, resi: &str, actor: &Actor) -> Result<TransitionResult, EngineError>;

    async fn order_history(&self, order_id: i64) -> Result<Vec<StatusHistoryEntry>, EngineError>;

    async fn stock_movements_for_order(&self, order_id: i64) -> Result<Vec<StockMovement>, EngineError>;

    async fn stock_ledger(&self, key: StockKey) -> Result<StockLedgerReport, EngineError>;

    /// PENDING orders created before `created_before`, oldest first.
    async fn fetch_expirable_orders(&self, created_before: DateTime<Utc>, limit: i64) -> Result<Vec<Order>, EngineError>;
}
