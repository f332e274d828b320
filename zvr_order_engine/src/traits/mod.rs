//! # Backend contracts
//!
//! This module defines the behaviour a database backend must expose to support the order engine. Every method is a
//! single atomic unit of work: implementations open one transaction, take the order row lock as the first statement
//! when the order is being mutated, and commit before returning. No method calls an external service.
//!
//! * [`OrderManagement`] creates orders (reserving stock), performs state-machine transitions, and answers order
//!   queries.
//! * [`PaymentManagement`] reserves payment slots, applies gateway statuses, records sync attempts and guards the email
//!   log.
//! * [`RefundManagement`] records refund requests and drives them through their own state machine, including the
//!   order-side effects of a completed refund.
//! * [`JobManagement`] provides the named leases and the reconciliation ledger used by the background jobs.
mod data_objects;
mod job_management;
mod order_management;
mod payment_management;
mod refund_management;

pub use data_objects::{
    NewRefund,
    NewRefundItem,
    PaymentChange,
    PaymentUpdateResult,
    ReconciliationTotals,
    RefundCompletedResult,
    RefundCompletion,
    RefundCreated,
    StatusChange,
    StockLedgerReport,
    TransitionResult,
};
pub use job_management::JobManagement;
pub use order_management::OrderManagement;
pub use payment_management::PaymentManagement;
pub use refund_management::RefundManagement;
