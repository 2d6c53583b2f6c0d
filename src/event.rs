//! Typed event subscriptions.
//!
//! A client fires four events: `open`, `message`, `error` and `close`.
//! Handlers are plain closures. They may be persistent (`on_*`) or fire at
//! most once (`once_*`). Dispatch is serialized, and once `close` has been
//! delivered the emitter is sealed: nothing fires after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::message::Message;

type OpenHandler = dyn Fn() + Send + Sync;
type MessageHandler = dyn Fn(&Message) + Send + Sync;
type ErrorHandler = dyn Fn(&Error) + Send + Sync;
type CloseHandler = dyn Fn(Option<&Error>) + Send + Sync;

/// Handle returned by every subscription, usable with
/// [`EventEmitter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event names, for introspection and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Error,
    Close,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Open => write!(f, "open"),
            EventKind::Message => write!(f, "message"),
            EventKind::Error => write!(f, "error"),
            EventKind::Close => write!(f, "close"),
        }
    }
}

struct Slot<H: ?Sized> {
    id: SubscriptionId,
    once: bool,
    handler: Arc<H>,
}

impl<H: ?Sized> Slot<H> {
    fn new(id: SubscriptionId, once: bool, handler: Arc<H>) -> Self {
        Self { id, once, handler }
    }
}

/// Clone the handlers of one event and drop its one-shot slots.
fn take_handlers<H: ?Sized>(slots: &mut Vec<Slot<H>>) -> Vec<Arc<H>> {
    let handlers = slots.iter().map(|slot| Arc::clone(&slot.handler)).collect();
    slots.retain(|slot| !slot.once);
    handlers
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    open: Vec<Slot<OpenHandler>>,
    message: Vec<Slot<MessageHandler>>,
    error: Vec<Slot<ErrorHandler>>,
    close: Vec<Slot<CloseHandler>>,
}

impl Registry {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Open => self.open.len(),
            EventKind::Message => self.message.len(),
            EventKind::Error => self.error.len(),
            EventKind::Close => self.close.len(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subscription registry and dispatcher for client events.
///
/// Handlers run on whichever task fires the event: the background receiver
/// for `open`, `message` and most `error`/`close` events, or the caller's
/// task for a locally initiated `close`. They must not block.
///
/// A handler may subscribe or unsubscribe other handlers; the change takes
/// effect from the next event on.
#[derive(Default)]
pub struct EventEmitter {
    registry: Mutex<Registry>,
    /// Held while handlers run.
    dispatch: Mutex<()>,
    sealed: AtomicBool,
}

impl EventEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe<H, S>(&self, select: S, once: bool, handler: Arc<H>) -> SubscriptionId
    where
        H: ?Sized,
        S: FnOnce(&mut Registry) -> &mut Vec<Slot<H>>,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id();
        select(&mut registry).push(Slot::new(id, once, handler));
        id
    }

    pub fn on_open<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe::<OpenHandler, _>(|r| &mut r.open, false, Arc::new(handler))
    }

    pub fn once_open<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe::<OpenHandler, _>(|r| &mut r.open, true, Arc::new(handler))
    }

    pub fn on_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe::<MessageHandler, _>(|r| &mut r.message, false, Arc::new(handler))
    }

    pub fn once_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe::<MessageHandler, _>(|r| &mut r.message, true, Arc::new(handler))
    }

    pub fn on_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.subscribe::<ErrorHandler, _>(|r| &mut r.error, false, Arc::new(handler))
    }

    pub fn once_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.subscribe::<ErrorHandler, _>(|r| &mut r.error, true, Arc::new(handler))
    }

    /// Subscribe to the terminal `close` event. The argument is the error
    /// that ended the connection, or `None` for a clean close.
    pub fn on_close<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Option<&Error>) + Send + Sync + 'static,
    {
        self.subscribe::<CloseHandler, _>(|r| &mut r.close, false, Arc::new(handler))
    }

    pub fn once_close<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Option<&Error>) + Send + Sync + 'static,
    {
        self.subscribe::<CloseHandler, _>(|r| &mut r.close, true, Arc::new(handler))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut registry = lock(&self.registry);
        let before = [
            registry.open.len(),
            registry.message.len(),
            registry.error.len(),
            registry.close.len(),
        ];
        registry.open.retain(|slot| slot.id != id);
        registry.message.retain(|slot| slot.id != id);
        registry.error.retain(|slot| slot.id != id);
        registry.close.retain(|slot| slot.id != id);
        let after = [
            registry.open.len(),
            registry.message.len(),
            registry.error.len(),
            registry.close.len(),
        ];
        before != after
    }

    /// Number of live subscriptions for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        lock(&self.registry).count(kind)
    }

    /// Whether `close` has fired. Safe to call from inside a handler.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub(crate) fn emit_open(&self) {
        let _dispatch = lock(&self.dispatch);
        if self.is_sealed() {
            return;
        }
        let handlers = take_handlers(&mut lock(&self.registry).open);
        for handler in handlers {
            handler();
        }
    }

    pub(crate) fn emit_message(&self, message: &Message) {
        let _dispatch = lock(&self.dispatch);
        if self.is_sealed() {
            return;
        }
        let handlers = take_handlers(&mut lock(&self.registry).message);
        for handler in handlers {
            handler(message);
        }
    }

    pub(crate) fn emit_error(&self, error: &Error) {
        let _dispatch = lock(&self.dispatch);
        if self.is_sealed() {
            return;
        }
        let handlers = take_handlers(&mut lock(&self.registry).error);
        for handler in handlers {
            handler(error);
        }
    }

    /// Deliver `close` and seal the emitter. Returns `false` if it was
    /// already sealed.
    pub(crate) fn emit_close(&self, error: Option<&Error>) -> bool {
        let _dispatch = lock(&self.dispatch);
        if self.sealed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let handlers = take_handlers(&mut lock(&self.registry).close);
        for handler in handlers {
            handler(error);
        }

        // Nothing can fire any more; release handlers (and any client
        // handles they captured).
        let mut registry = lock(&self.registry);
        registry.open.clear();
        registry.message.clear();
        registry.error.clear();
        registry.close.clear();
        true
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = lock(&self.registry);
        f.debug_struct("EventEmitter")
            .field("open", &registry.open.len())
            .field("message", &registry.message.len())
            .field("error", &registry.error.len())
            .field("close", &registry.close.len())
            .finish()
    }
}
