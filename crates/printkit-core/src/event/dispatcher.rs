//! Event dispatch to registered handlers
//!
//! Keeps the handler registry and fans events out synchronously on the
//! triggering thread. A panicking handler is logged and skipped, never
//! allowed to take down the listener or sender.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::handler::PrinterEventHandler;
use crate::gcode::{GCode, GLine};

/// Handle for a registered event handler, used to unregister it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerHandle(Uuid);

/// Registry of printer event handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Vec<(HandlerHandle, Arc<dyn PrinterEventHandler>)>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; returns a handle for later removal.
    pub fn register(&self, handler: Arc<dyn PrinterEventHandler>) -> HandlerHandle {
        let handle = HandlerHandle(Uuid::new_v4());
        self.handlers.write().push((handle.clone(), handler));
        handle
    }

    /// Remove a handler. Returns true if it was registered.
    pub fn unregister(&self, handle: &HandlerHandle) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(h, _)| h != handle);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Invoke `f` on every registered handler, in registration order.
    ///
    /// `name` labels the event for diagnostics when a handler panics.
    pub fn dispatch(&self, name: &str, f: impl Fn(&dyn PrinterEventHandler)) {
        let handlers = self.handlers.read().clone();
        for (_, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| f(handler.as_ref()))).is_err() {
                tracing::error!("'{}' handler panicked", name);
            }
        }
    }

    /// Deliver an event kind the handler trait has no dedicated method
    /// for; handlers see it through their `on_uncaught_event` fallback.
    pub fn dispatch_uncaught(&self, name: &str, payload: &str) {
        self.dispatch(name, |h| h.on_uncaught_event(name, payload));
    }

    /// Thread a main-queue line through the handlers' presend hooks.
    ///
    /// Each handler sees the previous handler's output; the first `None`
    /// skips the line entirely.
    pub fn dispatch_printpresend(
        &self,
        gline: &GLine,
        index: usize,
        mainqueue: &GCode,
    ) -> Option<GLine> {
        let handlers = self.handlers.read().clone();
        let mut current = gline.clone();
        for (_, handler) in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| {
                handler.on_printpresend(&current, index, mainqueue)
            }));
            match result {
                Ok(Some(next)) => current = next,
                Ok(None) => return None,
                Err(_) => tracing::error!("'printpresend' handler panicked"),
            }
        }
        Some(current)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
