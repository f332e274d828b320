//! ZVR Order Engine
//!
//! The order engine runs the order lifecycle of the ZVR fashion store: checkout with stock reservation, payment
//! through an external gateway, fulfilment, and refunds. It is independent of the HTTP layer and of any particular
//! payment or shipping provider.
//!
//! The library is divided into these main sections:
//! 1. Database management ([`mod@sqlite`] and [`mod@traits`]). The traits describe the atomic units of work a backend
//!    must provide; every one of them serialises on the order row. SQLite is the supported backend. The data types
//!    stored in the database are defined in [`mod@db_types`] and are public.
//! 2. The state machines ([`mod@state_machine`]). Allowed order and refund transitions are plain tables.
//! 3. The public API ([`mod@zvr_api`]): [`OrderFlowApi`], [`PaymentApi`], [`RefundApi`] and [`JobsApi`]. These are
//!    what the server calls.
//! 4. The external collaborators ([`mod@collaborators`]): narrow traits for the payment gateway, the shipping gateway
//!    and the mailer. Concrete clients live in their own crate.
//!
//! The engine also emits events when orders are paid or annulled and when refunds complete. See [`mod@events`] for
//! how to hook into them.
pub mod collaborators;
pub mod db_types;
pub mod errors;
pub mod events;
pub mod helpers;
pub mod sqlite;
pub mod state_machine;
pub mod traits;
pub mod zvr_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use errors::{EngineError, ErrorKind};
pub use sqlite::SqliteDatabase;
pub use traits::{JobManagement, OrderManagement, PaymentManagement, RefundManagement};
pub use zvr_api::{
    job_objects,
    order_objects,
    payment_objects,
    refund_objects,
    GatewayDeadlines,
    JobConfig,
    JobsApi,
    OrderFlowApi,
    OrderFlowConfig,
    PaymentApi,
    RefundApi,
};
