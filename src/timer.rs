//! Timer handles: the one fully-wired handle kind.
//!
//! A timer is `Idle` until started, `Active` while a tick is scheduled, and
//! back to `Idle` on stop or when a non-repeating timer delivers its single
//! tick. The tick callback is registered at start and released exactly once:
//! on one-shot delivery, or uninvoked on stop/close/finalize.

use crate::bridge::TickCallback;
use crate::error::{Error, Result};
use crate::event_loop::LoopInner;
use crate::handle::{open_slot_mut, Handle, HandleCore, HandleId, SlotRelease};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A timer handle. See [`crate::EventLoop::timer`].
///
/// Derefs to [`Handle`] for the kind-agnostic surface (`close`, `inspect`).
/// Clones refer to the same timer.
#[derive(Clone)]
pub struct Timer {
    handle: Handle,
}

impl Deref for Timer {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        &self.handle
    }
}

impl Timer {
    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Start the timer: `callback` fires after `timeout_ms`, then every
    /// `repeat_ms` until stopped (`repeat_ms == 0` fires once).
    ///
    /// Valid only while idle; fails with `InvalidState` if the timer is
    /// already started or closed, and with `Argument` if the delays are
    /// outside the schedulable range.
    pub fn start(
        &self,
        timeout_ms: u64,
        repeat_ms: u64,
        callback: impl FnMut() + 'static,
    ) -> Result<()> {
        let inner = self.handle.core.require_loop()?;
        let released = inner.borrow_mut().timer_start(
            &self.handle.core,
            timeout_ms,
            repeat_ms,
            Box::new(callback),
        )?;
        drop(released);
        Ok(())
    }

    /// Stop the timer, releasing the tick callback without invoking it.
    /// No-op while idle; fails with `InvalidState` after close.
    pub fn stop(&self) -> Result<()> {
        let inner = self.handle.core.require_loop()?;
        let released = inner.borrow_mut().timer_stop(self.handle.core.id)?;
        drop(released);
        Ok(())
    }

    /// Restart the countdown at the current repeat interval, keeping the
    /// registered callback. Valid only while the timer is active.
    pub fn again(&self) -> Result<()> {
        let inner = self.handle.core.require_loop()?;
        let result = inner.borrow_mut().timer_again(self.handle.core.id);
        result
    }

    /// Change the repeat interval. Does not affect whether the timer is
    /// running; an active timer picks the new interval up at its next
    /// re-arm.
    pub fn set_repeat(&self, repeat_ms: u64) -> Result<()> {
        let inner = self.handle.core.require_loop()?;
        let mut inner = inner.borrow_mut();
        let slot = open_slot_mut(&mut inner.slots, self.handle.core.id)?;
        slot.state.timer_mut().repeat_ms = repeat_ms;
        Ok(())
    }

    /// The current repeat interval in milliseconds.
    pub fn repeat(&self) -> Result<u64> {
        let inner = self.handle.core.require_loop()?;
        let mut inner = inner.borrow_mut();
        let slot = open_slot_mut(&mut inner.slots, self.handle.core.id)?;
        Ok(slot.state.timer().repeat_ms)
    }

    /// Whether the timer is currently started.
    pub fn is_active(&self) -> Result<bool> {
        let inner = self.handle.core.require_loop()?;
        let mut inner = inner.borrow_mut();
        let slot = open_slot_mut(&mut inner.slots, self.handle.core.id)?;
        Ok(slot.state.timer().active)
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.handle, f)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.handle, f)
    }
}

// =============================================================================
// State machine (loop side)
// =============================================================================

fn deadline_after(now: Instant, ms: u64, what: &'static str) -> Result<Instant> {
    now.checked_add(Duration::from_millis(ms))
        .ok_or(Error::Argument(what))
}

impl LoopInner {
    pub(crate) fn timer_start(
        &mut self,
        core: &Rc<HandleCore>,
        timeout_ms: u64,
        repeat_ms: u64,
        callback: TickCallback,
    ) -> Result<SlotRelease> {
        let now = Instant::now();
        let deadline = deadline_after(now, timeout_ms, "timeout_ms is out of range")?;
        deadline_after(now, repeat_ms, "repeat_ms is out of range")?;

        let slot = open_slot_mut(&mut self.slots, core.id)?;
        let state = slot.state.timer_mut();
        if state.active {
            return Err(Error::InvalidState("timer is already started"));
        }

        state.repeat_ms = repeat_ms;
        state.active = true;
        let mut release = SlotRelease::none();
        release.tick = state.tick.register(callback);
        slot.keepalive = Some(Rc::clone(core));
        self.wheel.insert(core.id, deadline);
        Ok(release)
    }

    pub(crate) fn timer_stop(&mut self, id: HandleId) -> Result<SlotRelease> {
        let slot = open_slot_mut(&mut self.slots, id)?;
        let state = slot.state.timer_mut();
        state.active = false;
        let mut release = SlotRelease::none();
        release.tick = state.tick.release();
        release.keepalive = slot.keepalive.take();
        self.wheel.remove(id);
        Ok(release)
    }

    pub(crate) fn timer_again(&mut self, id: HandleId) -> Result<()> {
        let now = Instant::now();
        let slot = open_slot_mut(&mut self.slots, id)?;
        let state = slot.state.timer_mut();
        if !state.active {
            return Err(Error::InvalidState("timer is not started"));
        }
        let deadline = deadline_after(now, state.repeat_ms, "repeat_ms is out of range")?;
        self.wheel.insert(id, deadline);
        Ok(())
    }

    /// Take a due timer's callback for dispatch, re-arming a repeating timer
    /// first and returning a one-shot to idle before its final tick runs.
    ///
    /// Returns `None` when the tick must be suppressed: the handle was
    /// closed or stopped earlier in this batch, or an entry is back in the
    /// wheel, which means the timer was re-armed after the batch was drained
    /// and its next tick belongs to a later iteration.
    pub(crate) fn prepare_tick(
        &mut self,
        id: HandleId,
    ) -> Option<(TickCallback, SlotRelease)> {
        if self.wheel.contains(id) {
            return None;
        }
        let (callback, repeat_ms) = {
            let slot = self.slots.get_mut(&id)?;
            if slot.closed {
                return None;
            }
            let state = slot.state.timer_mut();
            if !state.active {
                return None;
            }
            (state.tick.take()?, state.repeat_ms)
        };

        let mut release = SlotRelease::none();
        let rearmed = repeat_ms > 0
            && match Instant::now().checked_add(Duration::from_millis(repeat_ms)) {
                Some(deadline) => {
                    self.wheel.insert(id, deadline);
                    true
                }
                None => {
                    log::error!("timer {id} repeat interval is unschedulable; stopping it");
                    false
                }
            };
        if !rearmed {
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.state.timer_mut().active = false;
                release.keepalive = slot.keepalive.take();
            }
        }
        Some((callback, release))
    }

    /// Re-install a dispatched tick callback, unless the timer was stopped,
    /// closed, or re-armed with a new callback while it ran. Returns the
    /// callback when it is stale so the caller can drop it.
    pub(crate) fn finish_tick(
        &mut self,
        id: HandleId,
        callback: TickCallback,
    ) -> Option<TickCallback> {
        let Some(slot) = self.slots.get_mut(&id) else {
            return Some(callback);
        };
        if slot.closed {
            return Some(callback);
        }
        let state = slot.state.timer_mut();
        if !state.active {
            return Some(callback);
        }
        state.tick.restore(callback)
    }
}
