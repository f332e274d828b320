use crate::{
    db_types::{Actor, Order, Payment, Refund, RefundCode, RefundItem, RefundStatus, StatusHistoryEntry},
    errors::EngineError,
    traits::{
        data_objects::{NewRefund, RefundCompletedResult, RefundCompletion, RefundCreated},
        OrderManagement,
    },
};

#[allow(async_fn_in_trait)]
pub trait RefundManagement: OrderManagement {
    /// Validates and stores a refund request with its items and the initial history row. If a refund with the same
    /// idempotency key exists it is returned unchanged, or `IdempotencyConflict` is raised if the request differs.
    async fn create_refund(&self, refund: NewRefund) -> Result<RefundCreated, EngineError>;

    async fn fetch_refund(&self, id: i64) -> Result<Option<Refund>, EngineError>;

    async fn fetch_refund_by_code(&self, code: &RefundCode) -> Result<Option<Refund>, EngineError>;

    async fn fetch_refund_items(&self, refund_id: i64) -> Result<Vec<RefundItem>, EngineError>;

    async fn refunds_for_order(&self, order_id: i64) -> Result<Vec<Refund>, EngineError>;

    async fn refund_history(&self, refund_id: i64) -> Result<Vec<StatusHistoryEntry>, EngineError>;

    /// Moves the refund to PROCESSING under the order lock if its current status is one of `allowed_from`. Returns
    /// the refund, its order and the settled payment it refunds against, if any.
    async fn begin_refund_processing(
        &self,
        refund_id: i64,
        allowed_from: &[RefundStatus],
        actor: &Actor,
    ) -> Result<(Refund, Order, Option<Payment>), EngineError>;

    /// Completes the refund and applies its effects to the order: refunded amount and status, REFUNDED when fully
    /// refunded and the edge exists, and at-most-once stock restoration for ITEM_ONLY refunds.
    async fn complete_refund(
        &self,
        refund_id: i64,
        completion: RefundCompletion,
        actor: &Actor,
    ) -> Result<RefundCompletedResult, EngineError>;

    /// Records a gateway failure. Transient failures leave the refund in PROCESSING for a later retry; permanent ones
    /// move it to FAILED. The gateway response, if any, is appended to the refund's response history.
    async fn record_refund_failure(
        &self,
        refund_id: i64,
        error: &str,
        response: Option<&str>,
        transient: bool,
        actor: &Actor,
    ) -> Result<Refund, EngineError>;

    /// Moves a PENDING refund to REJECTED or CANCELLED.
    async fn close_refund(
        &self,
        refund_id: i64,
        to: RefundStatus,
        actor: &Actor,
        reason: &str,
    ) -> Result<Refund, EngineError>;
}
