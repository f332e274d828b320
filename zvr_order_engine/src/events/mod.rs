//! Stateless pub-sub hooks for order engine events.
//!
//! Components subscribe a handler per event type. Handlers only see the event itself, never the engine state, and run
//! after the transaction that produced the event has committed.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
