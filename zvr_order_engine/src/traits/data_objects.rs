use serde::{Deserialize, Serialize};

use crate::db_types::{
    Actor,
    Order,
    OrderCode,
    OrderStatusType,
    Payment,
    PaymentStatus,
    Refund,
    RefundItem,
    RefundReason,
    RefundType,
    Rupiah,
    StockKey,
    StockMovement,
};

/// A requested order status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub to: OrderStatusType,
    pub actor: Actor,
    pub reason: Option<String>,
}

impl StatusChange {
    pub fn new(to: OrderStatusType, actor: Actor) -> Self {
        Self { to, actor, reason: None }
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub from: OrderStatusType,
    pub order: Order,
    /// RELEASE movements written by this transition. Empty unless stock was restored.
    pub released: Vec<StockMovement>,
}

/// Recomputed stock for one SKU against its movement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerReport {
    pub key: StockKey,
    pub initial_stock: i64,
    pub reserved: i64,
    pub deducted: i64,
    pub released: i64,
    pub expected_stock: i64,
    pub current_stock: i64,
}

impl StockLedgerReport {
    pub fn is_consistent(&self) -> bool {
        self.expected_stock == self.current_stock
    }
}

//--------------------------------------         Payments        -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChange {
    /// The payment moved between statuses.
    Applied { from: PaymentStatus, to: PaymentStatus },
    /// The gateway status matches what is already recorded.
    Unchanged,
    /// The same gateway transaction was already applied.
    Duplicate,
    /// The payment is closed and the gateway reports something other than a settlement. Nothing changed.
    Stale,
    /// A settlement arrived for a payment or order that had already been closed locally. The payment is marked
    /// SUCCESS but the order is left alone; a mismatch is logged for an operator.
    LateSettlement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdateResult {
    pub payment: Payment,
    pub order: Order,
    pub change: PaymentChange,
    /// Set when this update moved the order, e.g. to PAID or EXPIRED.
    pub order_transition: Option<(OrderStatusType, OrderStatusType)>,
}

impl PaymentUpdateResult {
    pub fn order_became(&self, status: OrderStatusType) -> bool {
        matches!(self.order_transition, Some((_, to)) if to == status)
    }
}

//--------------------------------------          Refunds        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRefundItem {
    pub order_item_id: i64,
    pub quantity: i64,
    /// Defaults to `quantity × price_per_unit` of the order item.
    pub refund_amount: Option<Rupiah>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefund {
    pub order_code: OrderCode,
    pub refund_type: RefundType,
    pub reason: RefundReason,
    pub reason_detail: Option<String>,
    pub idempotency_key: String,
    pub shipping_refund: Option<Rupiah>,
    pub items_refund: Option<Rupiah>,
    pub items: Vec<NewRefundItem>,
    pub requested_by: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundCreated {
    pub refund: Refund,
    pub items: Vec<RefundItem>,
    /// False when an earlier refund with the same idempotency key was returned instead.
    pub created: bool,
}

/// How a refund reached COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundCompletion {
    Gateway { gateway_refund_id: String, response: String },
    Manual { note: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundCompletedResult {
    pub refund: Refund,
    pub order: Order,
    /// Set if completing the refund moved the order to REFUNDED.
    pub order_refunded: bool,
    pub restocked: Vec<StockMovement>,
}

//--------------------------------------      Reconciliation     -------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTotals {
    pub orders_created: i64,
    pub orders_paid: i64,
    pub order_revenue: Rupiah,
    pub payments_settled: Rupiah,
    pub refunds_completed: Rupiah,
    pub net_revenue: Rupiah,
    pub mismatches: Vec<String>,
}
