//! # Engine APIs
//!
//! The public face of the order engine. Each API is generic over a backend that implements the traits in
//! [`crate::traits`], and over the external collaborators it needs. None of them hold a database transaction across a
//! call to an external service.
//!
//! * [`OrderFlowApi`] handles checkout, state-machine transitions, shipping and the expiry of unpaid orders.
//! * [`PaymentApi`] opens gateway charges, processes webhooks, polls the gateway for missed updates and sends the
//!   payment received email.
//! * [`RefundApi`] creates refunds and drives them through the gateway.
//! * [`JobsApi`] runs the background jobs under named leases.
pub mod config;
pub mod job_objects;
pub mod jobs_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_api;
pub mod payment_objects;
pub mod refund_api;
pub mod refund_objects;

pub use config::{GatewayDeadlines, JobConfig, OrderFlowConfig};
pub use jobs_api::JobsApi;
pub use order_flow_api::OrderFlowApi;
pub use payment_api::PaymentApi;
pub use refund_api::RefundApi;
