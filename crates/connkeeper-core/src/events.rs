//! Lifecycle notifications for managed connections.
//!
//! A manager reports what happens to its connection (published, failing,
//! replaced, disposed) as values of a type implementing [`ConnectionEvent`].
//! Hosts subscribe by registering [`EventListener`]s; the manager calls them
//! synchronously, outside its state lock, in registration order.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// A notification about a managed connection.
pub trait ConnectionEvent: Send + Sync + fmt::Debug {
    /// Stable snake_case name of the event kind, e.g. `"reconnected"`.
    fn event_type(&self) -> &'static str;

    /// Instant the manager's clock read when the event happened.
    fn timestamp(&self) -> Instant;

    /// Configured name of the manager that emitted the event.
    fn manager_name(&self) -> &str;
}

/// Receives connection events.
///
/// Called on the thread that caused the event, which may be a caller of
/// `check_exception` or a background reconnection task. Keep it short and
/// never block.
pub trait EventListener<E: ConnectionEvent>: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &E);
}

type SharedListener<E> = Arc<dyn EventListener<E>>;

/// Listeners registered on one manager.
///
/// Cloning shares the registered listeners.
#[derive(Clone)]
pub struct EventListeners<E: ConnectionEvent> {
    entries: Vec<SharedListener<E>>,
}

impl<E: ConnectionEvent> EventListeners<E> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `listener` after the ones already present.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.entries.push(Arc::new(listener));
    }

    /// Delivers `event` to every listener.
    ///
    /// A listener that panics is skipped over; the panic stays here and the
    /// manager's bookkeeping carries on.
    pub fn emit(&self, event: &E) {
        for listener in &self.entries {
            let _ = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<E: ConnectionEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ConnectionEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Adapts a closure into an [`EventListener`].
///
/// ```
/// use connkeeper_core::{ConnectionEvent, EventListeners, FnListener};
/// # use std::time::Instant;
/// # #[derive(Debug)]
/// # struct Dropped;
/// # impl ConnectionEvent for Dropped {
/// #     fn event_type(&self) -> &'static str { "dropped" }
/// #     fn timestamp(&self) -> Instant { Instant::now() }
/// #     fn manager_name(&self) -> &str { "cache" }
/// # }
///
/// let mut listeners = EventListeners::new();
/// listeners.add(FnListener::new(|event: &Dropped| {
///     println!("{}: {}", event.manager_name(), event.event_type());
/// }));
/// listeners.emit(&Dropped);
/// ```
pub struct FnListener<E, F> {
    f: F,
    _event: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ConnectionEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
