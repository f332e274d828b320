use chrono::{DateTime, Utc};
use mockall::mock;
use zvr_order_engine::{
    db_types::{Actor, NewOrder, Order, OrderCode, OrderItem, StatusHistoryEntry, StockKey, StockMovement},
    traits::{OrderManagement, StatusChange, StockLedgerReport, TransitionResult},
    EngineError,
};

mock! {
    pub OrderManager {}
    impl Clone for OrderManager {
        fn clone(&self) -> Self;
    }
    impl OrderManagement for OrderManager {
        fn now(&self) -> DateTime<Utc>;
        async fn create_order(&self, order: NewOrder, actor: &Actor) -> Result<(Order, Vec<OrderItem>), EngineError>;
        async fn fetch_order(&self, code: &OrderCode) -> Result<Option<Order>, EngineError>;
        async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, EngineError>;
        async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, EngineError>;
        async fn transition_order(&self, code: &OrderCode, change: StatusChange) -> Result<TransitionResult, EngineError>;
        async fn set_resi(&self, code: &OrderCode, resi: &str, actor: &Actor) -> Result<Order, EngineError>;
        async fn ship_with_resi(&self, code: &OrderCode, resi: &str, actor: &Actor) -> Result<TransitionResult, EngineError>;
        async fn order_history(&self, order_id: i64) -> Result<Vec<StatusHistoryEntry>, EngineError>;
        async fn stock_movements_for_order(&self, order_id: i64) -> Result<Vec<StockMovement>, EngineError>;
        async fn stock_ledger(&self, key: StockKey) -> Result<StockLedgerReport, EngineError>;
        async fn fetch_expirable_orders(&self, created_before: DateTime<Utc>, limit: i64) -> Result<Vec<Order>, EngineError>;
    }
}
