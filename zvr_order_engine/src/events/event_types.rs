use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType, Payment, Refund};

/// An order moved to PAID. `payment` is absent when an admin marked it paid by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub payment: Option<Payment>,
}

impl OrderPaidEvent {
    pub fn new(order: Order, payment: Option<Payment>) -> Self {
        Self { order, payment }
    }
}

/// An order was cancelled, failed or expired, and its stock released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundCompletedEvent {
    pub refund: Refund,
    pub order: Order,
}

impl RefundCompletedEvent {
    pub fn new(refund: Refund, order: Order) -> Self {
        Self { refund, order }
    }
}
