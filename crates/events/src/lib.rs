//! Ledger events and the mechanics for distributing them.
//!
//! Domain events are defined next to the aggregate that emits them; this crate
//! only carries the domain-agnostic pieces (event trait, envelope, bus).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
