//! Typed callback storage for the native-to-embedder dispatch bridge.
//!
//! A [`CallbackSlot`] holds at most one registered callback. The driver's
//! dispatch protocol is take → invoke with no loop borrow held → restore if
//! the slot still wants the callback. Together with the keepalive token in
//! the handle slot this gives each registered callback an exactly-once
//! release: invoked (one-shot), restored for the next tick (repeating), or
//! dropped uninvoked (stop, close, finalizer).
//!
//! Callbacks are plain boxed closures without `Send` bounds; the loop is
//! single-threaded and never moves them across threads.

/// A timer tick callback. Invoked with no arguments, possibly many times.
pub(crate) type TickCallback = Box<dyn FnMut()>;

/// A close-completion callback. Invoked exactly once, from the close phase.
pub(crate) type CloseCallback = Box<dyn FnOnce()>;

/// A slot holding at most one registered callback.
pub(crate) struct CallbackSlot<F> {
    cb: Option<F>,
}

impl<F> CallbackSlot<F> {
    pub(crate) fn new() -> Self {
        Self { cb: None }
    }

    /// Register a callback, returning any displaced one so the caller can
    /// drop it outside the loop borrow.
    #[must_use]
    pub(crate) fn register(&mut self, cb: F) -> Option<F> {
        self.cb.replace(cb)
    }

    /// Take the callback out for dispatch.
    pub(crate) fn take(&mut self) -> Option<F> {
        self.cb.take()
    }

    /// Put a dispatched callback back, unless the slot was re-armed while it
    /// was out; in that case the callback comes back to the caller to drop.
    #[must_use]
    pub(crate) fn restore(&mut self, cb: F) -> Option<F> {
        if self.cb.is_none() {
            self.cb = Some(cb);
            None
        } else {
            Some(cb)
        }
    }

    /// Release the callback without invoking it.
    pub(crate) fn release(&mut self) -> Option<F> {
        self.cb.take()
    }

    /// Whether a callback is currently registered.
    pub(crate) fn is_armed(&self) -> bool {
        self.cb.is_some()
    }
}

impl<F> Default for CallbackSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}
