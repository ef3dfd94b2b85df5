//! `intake-events` — domain event mechanics (no business rules).
//!
//! - `Event`: typed, named domain facts
//! - `EventEnvelope`: the unit published on a bus
//! - `EventBus` / `InMemoryEventBus`: at-least-once pub/sub
//! - `HandlerRegistry`: explicit dispatch table built at process startup

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{HandlerFn, HandlerRegistry, Routable};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
