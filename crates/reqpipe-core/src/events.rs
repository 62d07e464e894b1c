//! Event system shared by the feature subsystems.
//!
//! Features emit typed events (retry attempts, cache hits, evictions) to
//! registered listeners. A panicking listener is isolated: the panic is
//! caught, logged, and the remaining listeners still run.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by the runtime's feature subsystems.
pub trait RuntimeEvent: Send + Sync + fmt::Debug {
    /// Short machine name of the event (e.g. "retry", "cache_hit").
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;
}

/// Trait for listening to runtime events.
pub trait EventListener<E: RuntimeEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// Type alias for shared event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// An ordered collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: RuntimeEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: RuntimeEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to every listener, isolating panics so one misbehaving
    /// listener cannot starve the rest.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if result.is_err() {
                tracing::warn!(
                    listener_index = index,
                    event_type = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: RuntimeEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: RuntimeEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
