//! Handle base: the table slot owned by the loop, the reference-counted
//! token held by the embedder, the close protocol, and the finalizer.
//!
//! The two halves are linked by ownership rather than by a garbage
//! collector: the loop's table slot owns the native state, the token is a
//! cloneable reference to it, and dropping the last token clone runs a
//! finalizer that force-closes whatever the embedder never closed. While a
//! tick callback is registered the slot holds a strong token reference back
//! (`keepalive`), so an actively-ticking handle is never finalized out from
//! under the loop.

use crate::bridge::{CallbackSlot, CloseCallback, TickCallback};
use crate::error::{Error, Result};
use crate::event_loop::LoopInner;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Identifies one handle within its loop. Ids are allocated monotonically
/// and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of native resource a handle wraps.
///
/// Only timers are wired today; the enum is non-exhaustive so the stream,
/// pipe, TTY and filesystem families can be added without breaking
/// embedders.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Timer,
}

impl HandleKind {
    /// Lowercase tag used by `inspect` and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Timer => "timer",
        }
    }
}

/// Timer-specific native state, stored inline in the slot.
pub(crate) struct TimerState {
    pub(crate) repeat_ms: u64,
    pub(crate) active: bool,
    pub(crate) tick: CallbackSlot<TickCallback>,
}

/// Kind-specific native state. The enum keeps every kind's state inline in
/// the slot, at a fixed size, at a stable location for the slot's lifetime.
pub(crate) enum HandleState {
    Timer(TimerState),
}

impl HandleState {
    pub(crate) fn timer_mut(&mut self) -> &mut TimerState {
        match self {
            HandleState::Timer(state) => state,
        }
    }

    pub(crate) fn timer(&self) -> &TimerState {
        match self {
            HandleState::Timer(state) => state,
        }
    }
}

/// One entry in the loop's handle table.
pub(crate) struct HandleSlot {
    pub(crate) kind: HandleKind,
    /// Latched on close; never reverts. The native state may be handed to
    /// the wheel or poller iff this is false.
    pub(crate) closed: bool,
    pub(crate) state: HandleState,
    pub(crate) close_cb: CallbackSlot<CloseCallback>,
    /// Strong token reference held while an operation that will call back
    /// is outstanding. Released on stop, one-shot completion, or close.
    pub(crate) keepalive: Option<Rc<HandleCore>>,
    /// Token allocation address, for `inspect`/`walk` diagnostics.
    pub(crate) token_addr: usize,
}

impl HandleSlot {
    pub(crate) fn new_timer(token_addr: usize) -> Self {
        Self {
            kind: HandleKind::Timer,
            closed: false,
            state: HandleState::Timer(TimerState {
                repeat_ms: 0,
                active: false,
                tick: CallbackSlot::new(),
            }),
            close_cb: CallbackSlot::new(),
            keepalive: None,
            token_addr,
        }
    }
}

/// Look up a slot that must still be open.
pub(crate) fn open_slot_mut(
    slots: &mut HashMap<HandleId, HandleSlot>,
    id: HandleId,
) -> Result<&mut HandleSlot> {
    match slots.get_mut(&id) {
        Some(slot) if !slot.closed => Ok(slot),
        _ => Err(Error::InvalidState("handle is closed")),
    }
}

/// Objects released from a slot while the loop was borrowed.
///
/// Dropping a callback or keepalive token can run a handle finalizer, which
/// re-enters the loop; callers drop this only after the borrow ends.
pub(crate) struct SlotRelease {
    pub(crate) tick: Option<TickCallback>,
    pub(crate) close: Option<CloseCallback>,
    pub(crate) keepalive: Option<Rc<HandleCore>>,
}

impl SlotRelease {
    pub(crate) fn none() -> Self {
        Self {
            tick: None,
            close: None,
            keepalive: None,
        }
    }
}

/// Shared core of a handle token. Dropping the last clone finalizes the
/// handle.
pub(crate) struct HandleCore {
    pub(crate) loop_: Weak<RefCell<LoopInner>>,
    pub(crate) id: HandleId,
    pub(crate) kind: HandleKind,
}

impl HandleCore {
    /// The owning loop, or `InvalidState` after loop teardown.
    pub(crate) fn require_loop(&self) -> Result<Rc<RefCell<LoopInner>>> {
        self.loop_
            .upgrade()
            .ok_or(Error::InvalidState("event loop has been dropped"))
    }
}

impl Drop for HandleCore {
    fn drop(&mut self) {
        let Some(inner) = self.loop_.upgrade() else {
            // Loop teardown already released the native state.
            return;
        };
        let released = match inner.try_borrow_mut() {
            Ok(mut inner) => inner.finalize_handle(self.id),
            Err(_) => {
                // A finalizer must never unwind; a held borrow here means a
                // release leaked inside the loop, so leak the state too.
                log::error!(
                    "finalizer for {} handle {} could not lock the loop; native state leaked",
                    self.kind.name(),
                    self.id
                );
                return;
            }
        };
        drop(released);
    }
}

/// A reference to a handle owned by an event loop.
///
/// Cloning a `Handle` (or any concrete kind, such as [`crate::Timer`])
/// creates another reference to the same underlying handle; the native
/// resource is finalized when the last clone is dropped, unless the loop
/// itself is keeping the handle alive for a pending callback.
#[derive(Clone)]
pub struct Handle {
    pub(crate) core: Rc<HandleCore>,
}

impl Handle {
    pub(crate) fn from_core(core: Rc<HandleCore>) -> Self {
        Self { core }
    }

    /// This handle's id within its loop.
    pub fn id(&self) -> HandleId {
        self.core.id
    }

    /// The kind of native resource this handle wraps.
    pub fn kind(&self) -> HandleKind {
        self.core.kind
    }

    /// Whether the handle has been closed. Also true once the owning loop
    /// has been dropped.
    pub fn is_closed(&self) -> bool {
        let Some(inner) = self.core.loop_.upgrade() else {
            return true;
        };
        let inner = inner.borrow();
        match inner.slots.get(&self.core.id) {
            Some(slot) => slot.closed,
            None => true,
        }
    }

    /// Close the handle, releasing its native resources.
    ///
    /// Safe to call repeatedly; a second close is a no-op and never
    /// re-releases anything. The handle stops keeping the loop alive and
    /// disappears from [`crate::EventLoop::walk`] once the close completes
    /// on the next loop iteration.
    pub fn close(&self) -> Result<()> {
        let Some(inner) = self.core.loop_.upgrade() else {
            return Ok(());
        };
        let released = inner.borrow_mut().close_handle(self.core.id, None);
        drop(released);
        Ok(())
    }

    /// Close the handle and invoke `callback` exactly once when the close
    /// completes. The callback runs from `run`, never synchronously here.
    ///
    /// If the handle is already closed the callback is discarded uninvoked.
    pub fn close_with(&self, callback: impl FnOnce() + 'static) -> Result<()> {
        let inner = self.core.require_loop()?;
        let released = inner
            .borrow_mut()
            .close_handle(self.core.id, Some(Box::new(callback)));
        drop(released);
        Ok(())
    }

    /// Human-readable tag for diagnostics: `[<kind> 0x<addr>]`.
    pub fn inspect(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} 0x{:x}]",
            self.core.kind.name(),
            Rc::as_ptr(&self.core) as usize
        )
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.core.id)
            .field("kind", &self.core.kind)
            .finish()
    }
}

// =============================================================================
// Close protocol (loop side)
// =============================================================================

impl LoopInner {
    /// Close a handle: latch `closed`, release kind resources uninvoked, arm
    /// the close callback, and queue the id for the close phase. No-op when
    /// the handle is already closed or gone; a callback passed then is
    /// handed back for dropping, uninvoked.
    pub(crate) fn close_handle(
        &mut self,
        id: HandleId,
        callback: Option<CloseCallback>,
    ) -> SlotRelease {
        let mut release = SlotRelease::none();
        let Some(slot) = self.slots.get_mut(&id) else {
            release.close = callback;
            return release;
        };
        if slot.closed {
            release.close = callback;
            return release;
        }

        slot.closed = true;
        match &mut slot.state {
            HandleState::Timer(state) => {
                state.active = false;
                release.tick = state.tick.release();
            }
        }
        release.keepalive = slot.keepalive.take();
        if let Some(callback) = callback {
            release.close = slot.close_cb.register(callback);
        }
        self.wheel.remove(id);
        self.closing.push_back(id);
        release
    }

    /// Finalizer-driven close: no callback, tolerant of an already-closed or
    /// already-removed handle. Never fails; there is no frame to throw into.
    pub(crate) fn finalize_handle(&mut self, id: HandleId) -> SlotRelease {
        match self.slots.get(&id) {
            Some(slot) if !slot.closed => {
                log::debug!("finalizing open {} handle {}", slot.kind.name(), id);
            }
            _ => return SlotRelease::none(),
        }
        self.close_handle(id, None)
    }
}
