//! Helpers for tests of the engine and of crates built on it: a throwaway SQLite database, a controllable clock,
//! stand-ins for the external collaborators, and catalog seeding.
pub mod catalog;
pub mod clock;
pub mod prepare_env;
pub mod stubs;

pub use clock::MockClock;
pub use stubs::{RecordingMailer, StubPaymentGateway, StubShippingGateway};
