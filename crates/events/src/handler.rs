//! Explicit event-handler dispatch table.
//!
//! Handlers are registered by event name at process startup and looked up per
//! message by the consuming loop. There is no global or implicit registration:
//! whoever builds the registry decides what runs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::EventEnvelope;

/// Messages that can be routed by name.
pub trait Routable {
    fn route_key(&self) -> &str;
}

impl<E> Routable for EventEnvelope<E> {
    fn route_key(&self) -> &str {
        self.event_type()
    }
}

/// A registered handler. Must be idempotent (at-least-once delivery).
pub type HandlerFn<M, Err> = Arc<dyn Fn(&M) -> Result<(), Err> + Send + Sync>;

/// Dispatch table from event name to handlers.
pub struct HandlerRegistry<M, Err> {
    handlers: HashMap<&'static str, Vec<HandlerFn<M, Err>>>,
}

impl<M, Err> HandlerRegistry<M, Err>
where
    M: Routable,
{
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for messages named `event_type`.
    pub fn register<F>(&mut self, event_type: &'static str, handler: F) -> &mut Self
    where
        F: Fn(&M) -> Result<(), Err> + Send + Sync + 'static,
    {
        self.handlers
            .entry(event_type)
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Register the same handler for several event names.
    pub fn register_all<F>(&mut self, event_types: &[&'static str], handler: F) -> &mut Self
    where
        F: Fn(&M) -> Result<(), Err> + Send + Sync + 'static,
    {
        let handler: HandlerFn<M, Err> = Arc::new(handler);
        for event_type in event_types {
            self.handlers
                .entry(event_type)
                .or_default()
                .push(handler.clone());
        }
        self
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Event names with at least one handler, sorted.
    pub fn event_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run every handler registered for the message's name, in registration order.
    ///
    /// Stops at the first failing handler. Returns how many handlers ran
    /// successfully; unrouted messages yield `Ok(0)`.
    pub fn dispatch(&self, message: &M) -> Result<usize, Err> {
        let Some(handlers) = self.handlers.get(message.route_key()) else {
            tracing::trace!(event_type = message.route_key(), "no handler registered");
            return Ok(0);
        };

        for handler in handlers {
            handler(message)?;
        }
        Ok(handlers.len())
    }
}

impl<M: Routable, Err> Default for HandlerRegistry<M, Err> {
    fn default() -> Self {
        Self::new()
    }
}
