use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    collaborators::GatewayError,
    db_types::{OrderCode, OrderStatusType, Rupiah, StockKey},
    state_machine::InvalidTransition,
};

/// Coarse classification of an [`EngineError`]. The HTTP layer maps each kind to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
    IdempotencyConflict,
    GatewayTransient,
    GatewayPermanent,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(String),
    #[error("{0} does not exist")]
    ProductNotFound(StockKey),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(String),
    #[error("Refund {0} does not exist")]
    RefundNotFound(String),
    #[error("Insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock { key: StockKey, requested: i64, available: i64 },
    #[error("Invalid status transition. {0}")]
    InvalidTransition(#[from] InvalidTransition),
    #[error("The tracking number cannot be changed while the order is {0}")]
    ResiLocked(OrderStatusType),
    #[error("Tracking number {0} is already assigned to another order")]
    DuplicateResi(String),
    #[error("Order {0} already has an open payment")]
    PaymentAlreadyExists(OrderCode),
    #[error("Order {code} cannot be paid while it is {status}")]
    OrderNotPayable { code: OrderCode, status: OrderStatusType },
    #[error("Order {code} cannot be refunded while it is {status}")]
    OrderNotRefundable { code: OrderCode, status: OrderStatusType },
    #[error("Refund of {requested} exceeds the refundable balance of {available}")]
    RefundExceedsBalance { requested: Rupiah, available: Rupiah },
    #[error("Idempotency key {0} was already used for a different request")]
    IdempotencyConflict(String),
    #[error("Payment gateway error. {0}")]
    GatewayError(#[from] GatewayError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            ValidationError(_) | RefundExceedsBalance { .. } => ErrorKind::Validation,
            OrderNotFound(_) | ProductNotFound(_) | PaymentNotFound(_) | RefundNotFound(_) => ErrorKind::NotFound,
            InsufficientStock { .. }
            | InvalidTransition(_)
            | ResiLocked(_)
            | DuplicateResi(_)
            | PaymentAlreadyExists(_)
            | OrderNotPayable { .. }
            | OrderNotRefundable { .. } => ErrorKind::StateConflict,
            IdempotencyConflict(_) => ErrorKind::IdempotencyConflict,
            GatewayError(e) if e.is_transient() => ErrorKind::GatewayTransient,
            GatewayError(_) => ErrorKind::GatewayPermanent,
            DatabaseError(_) | Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_gateway_timeout(&self) -> bool {
        matches!(self, EngineError::GatewayError(e) if e.is_timeout())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::DatabaseError(e.to_string())
    }
}

/// True if the error is a UNIQUE (or partial unique index) violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn kinds() {
        let e = EngineError::from(InvalidTransition::new("CANCELLED", "PAID"));
        assert_eq!(e.kind(), ErrorKind::StateConflict);
        assert_eq!(EngineError::OrderNotFound("x".into()).kind(), ErrorKind::NotFound);
        let e = EngineError::from(GatewayError::Timeout(Duration::from_secs(5)));
        assert_eq!(e.kind(), ErrorKind::GatewayTransient);
        assert!(e.is_gateway_timeout());
        let e = EngineError::from(GatewayError::Permanent { status: 400, message: "bad".into() });
        assert_eq!(e.kind(), ErrorKind::GatewayPermanent);
        assert!(!e.is_gateway_timeout());
        assert_eq!(EngineError::DatabaseError("x".into()).kind(), ErrorKind::Internal);
        assert_eq!(EngineError::IdempotencyConflict("K1".into()).kind(), ErrorKind::IdempotencyConflict);
    }
}
