//! Background consumers of the event bus.

pub mod event_worker;

pub use event_worker::{EventWorker, WorkerHandle};
