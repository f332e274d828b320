//! # ZVR order server
//! The HTTP surface of the ZVR store order engine. It is responsible for:
//! * Taking checkouts, quoting shipping and reserving stock through the engine.
//! * Opening payments with Midtrans and applying its webhook notifications.
//! * The admin fulfilment and refund operations.
//! * Running the expiry, payment sync and daily reconciliation jobs in the background.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: returns a 200 OK response.
//! * `/checkout`, `/orders/{code}`: public order routes. Contact details are masked unless the caller owns the order.
//! * `/payments/create`, `/webhook/payment`: payment creation and the gateway webhook.
//! * `/admin/...`: fulfilment, refunds, jobs and sync logs. These need the admin API key.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
