//! Transition tables for orders and refunds.
//!
//! The tables are plain data so that the full `from × to` grid can be tested exhaustively. Backends consult them while
//! holding the order lock; nothing else decides whether an edge exists.
use thiserror::Error;

use crate::db_types::{OrderStatusType, RefundStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

impl InvalidTransition {
    pub fn new<A: ToString, B: ToString>(from: A, to: B) -> Self {
        Self { from: from.to_string(), to: to.to_string() }
    }
}

//--------------------------------------          Orders         -------------------------------------------------------
pub fn allowed_order_transitions(from: OrderStatusType) -> &'static [OrderStatusType] {
    use OrderStatusType::*;
    match from {
        Pending => &[Paid, Cancelled, Failed, Expired],
        Paid => &[Packing, Cancelled],
        Packing => &[Shipped, Cancelled],
        Shipped => &[Delivered],
        Delivered => &[Completed, Refunded],
        Completed => &[Refunded],
        Cancelled | Failed | Expired | Refunded => &[],
    }
}

pub fn can_transition_order(from: OrderStatusType, to: OrderStatusType) -> bool {
    allowed_order_transitions(from).contains(&to)
}

pub fn check_order_transition(from: OrderStatusType, to: OrderStatusType) -> Result<(), InvalidTransition> {
    if can_transition_order(from, to) {
        Ok(())
    } else {
        Err(InvalidTransition::new(from, to))
    }
}

/// The write-once timestamp column set when an order enters `status`. `refunded_at` is owned by the refund workflow.
pub fn timestamp_column(status: OrderStatusType) -> Option<&'static str> {
    use OrderStatusType::*;
    match status {
        Paid => Some("paid_at"),
        Shipped => Some("shipped_at"),
        Delivered => Some("delivered_at"),
        Completed => Some("completed_at"),
        Cancelled => Some("cancelled_at"),
        Pending | Packing | Failed | Expired | Refunded => None,
    }
}

/// `resi` may only be written while the order is in one of these states.
pub fn resi_is_writable(status: OrderStatusType) -> bool {
    matches!(status, OrderStatusType::Paid | OrderStatusType::Packing)
}

/// Order statuses from which a refund may be requested. Admins may refund before delivery.
pub fn is_refundable(status: OrderStatusType, by_admin: bool) -> bool {
    use OrderStatusType::*;
    match status {
        Delivered | Completed => true,
        Paid | Packing | Shipped => by_admin,
        _ => false,
    }
}

//--------------------------------------          Refunds        -------------------------------------------------------
pub fn allowed_refund_transitions(from: RefundStatus) -> &'static [RefundStatus] {
    use RefundStatus::*;
    match from {
        Pending => &[Processing, Completed, Rejected, Cancelled],
        Processing => &[Completed, Failed, Processing],
        Failed => &[Processing, Completed],
        Partial | Completed | Rejected | Cancelled => &[],
    }
}

pub fn can_transition_refund(from: RefundStatus, to: RefundStatus) -> bool {
    allowed_refund_transitions(from).contains(&to)
}

pub fn check_refund_transition(from: RefundStatus, to: RefundStatus) -> Result<(), InvalidTransition> {
    if can_transition_refund(from, to) {
        Ok(())
    } else {
        Err(InvalidTransition::new(from, to))
    }
}

/// Refunds in these states count toward the refunded total of an order.
pub fn refund_counts_toward_total(status: RefundStatus) -> bool {
    !matches!(status, RefundStatus::Rejected | RefundStatus::Cancelled)
}
