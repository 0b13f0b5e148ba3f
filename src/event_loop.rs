//! Loop driver: owns the handle table, timer wheel, poller and closing
//! queue, and dispatches every callback.
//!
//! One iteration is poll → timer phase → close phase. The poll timeout
//! comes from the next timer deadline (zero while closes are pending), the
//! timer phase drains due timers through the callback bridge, and the close
//! phase completes pending closes and invokes their callbacks. `run`
//! iterates until no handle keeps the loop alive.
//!
//! Callbacks always run with no internal borrow held, so they are free to
//! start, stop, close or create handles; such mutations are picked up by the
//! dispatch re-checks and by the next iteration, never by the batch already
//! being delivered.

use crate::error::{Error, Result};
use crate::handle::{Handle, HandleCore, HandleId, HandleKind, HandleSlot};
use crate::poller::Poller;
use crate::timer::Timer;
use crate::wheel::TimerWheel;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Driver configuration. Plain defaults-plus-override.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// OS event buffer size per poller wake.
    pub event_capacity: usize,
    /// Upper bound on a single poll block. `None` waits until the next
    /// deadline; embedders that multiplex the loop with outside work set
    /// this to bound latency.
    pub max_poll_wait: Option<Duration>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            event_capacity: 64,
            max_poll_wait: None,
        }
    }
}

/// Counts of what the loop currently tracks.
#[derive(Debug, Clone, Copy)]
pub struct LoopStats {
    /// Handles in the table: idle, active, or close-pending.
    pub handles: usize,
    /// Timers with a scheduled deadline.
    pub active_timers: usize,
    /// Handles whose close has been requested but not yet completed.
    pub closing: usize,
}

/// One tracked handle, as seen by [`EventLoop::walk`].
#[derive(Debug, Clone)]
pub struct HandleView {
    pub id: HandleId,
    pub kind: HandleKind,
    /// Whether a close has been requested and not yet completed.
    pub closing: bool,
    pub(crate) token_addr: usize,
}

impl fmt::Display for HandleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} 0x{:x}]", self.kind.name(), self.token_addr)
    }
}

enum RunMode {
    Default,
    Once,
    NoWait,
}

pub(crate) struct LoopInner {
    pub(crate) poller: Poller,
    pub(crate) slots: HashMap<HandleId, HandleSlot>,
    pub(crate) wheel: TimerWheel,
    pub(crate) closing: VecDeque<HandleId>,
    next_id: u64,
    origin: Instant,
    running: bool,
    options: LoopOptions,
}

impl LoopInner {
    fn alloc_id(&mut self) -> HandleId {
        let id = HandleId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Whether anything keeps the loop turning: a scheduled timer or a
    /// pending close. Idle handles do not.
    pub(crate) fn alive(&self) -> bool {
        !self.wheel.is_empty() || !self.closing.is_empty()
    }

    fn poll_timeout(&self) -> Option<Duration> {
        if !self.closing.is_empty() {
            return Some(Duration::ZERO);
        }
        match (
            self.wheel.timeout_until_next(Instant::now()),
            self.options.max_poll_wait,
        ) {
            (Some(next), Some(max)) => Some(next.min(max)),
            (Some(next), None) => Some(next),
            (None, max) => max,
        }
    }
}

/// An event loop: the explicit context every handle is bound to.
///
/// Single-threaded; share it within the thread via `Rc` if callbacks need
/// to reach it. Dropping the loop releases every native resource it still
/// owns; handle tokens that outlive it become inert, and pending close
/// callbacks are dropped uninvoked.
pub struct EventLoop {
    inner: Rc<RefCell<LoopInner>>,
}

impl EventLoop {
    /// Create a loop with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(LoopOptions::default())
    }

    /// Create a loop with explicit options.
    pub fn with_options(options: LoopOptions) -> Result<Self> {
        let poller = Poller::new(options.event_capacity)?;
        Ok(Self {
            inner: Rc::new(RefCell::new(LoopInner {
                poller,
                slots: HashMap::new(),
                wheel: TimerWheel::new(),
                closing: VecDeque::new(),
                next_id: 1,
                origin: Instant::now(),
                running: false,
                options,
            })),
        })
    }

    /// Construct an idle timer handle bound to this loop.
    pub fn timer(&self) -> Result<Timer> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.alloc_id();
        let core = Rc::new(HandleCore {
            loop_: Rc::downgrade(&self.inner),
            id,
            kind: HandleKind::Timer,
        });
        inner
            .slots
            .insert(id, HandleSlot::new_timer(Rc::as_ptr(&core) as usize));
        drop(inner);
        Ok(Timer::from_handle(Handle::from_core(core)))
    }

    /// Drive the loop until no handle keeps it alive: every callback this
    /// crate ever delivers is delivered from inside a `run*` call.
    ///
    /// Fails with `InvalidState` when called from within a callback.
    pub fn run(&self) -> Result<()> {
        self.run_mode(RunMode::Default).map(|_| ())
    }

    /// Run one iteration, blocking for the next deadline. Returns whether
    /// the loop is still alive.
    pub fn run_once(&self) -> Result<bool> {
        self.run_mode(RunMode::Once)
    }

    /// Run one iteration without blocking. Returns whether the loop is
    /// still alive.
    pub fn run_nowait(&self) -> Result<bool> {
        self.run_mode(RunMode::NoWait)
    }

    /// Visit every handle the loop tracks: idle, active, or close-pending.
    /// A closed handle stops being visited once its close completes. The
    /// visitor observes; it cannot mutate handle state through the view.
    pub fn walk(&self, mut visitor: impl FnMut(&HandleView)) {
        let views: Vec<HandleView> = {
            let inner = self.inner.borrow();
            let mut views: Vec<HandleView> = inner
                .slots
                .iter()
                .map(|(&id, slot)| HandleView {
                    id,
                    kind: slot.kind,
                    closing: slot.closed,
                    token_addr: slot.token_addr,
                })
                .collect();
            views.sort_by_key(|view| view.id);
            views
        };
        for view in &views {
            visitor(view);
        }
    }

    /// Whether any handle currently keeps the loop alive.
    pub fn alive(&self) -> bool {
        self.inner.borrow().alive()
    }

    /// Milliseconds since the loop was created.
    pub fn now_ms(&self) -> u64 {
        self.inner.borrow().origin.elapsed().as_millis() as u64
    }

    /// Counts of tracked handles, scheduled timers and pending closes.
    pub fn stats(&self) -> LoopStats {
        let inner = self.inner.borrow();
        LoopStats {
            handles: inner.slots.len(),
            active_timers: inner.wheel.len(),
            closing: inner.closing.len(),
        }
    }

    fn run_mode(&self, mode: RunMode) -> Result<bool> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.running {
                return Err(Error::InvalidState("event loop is already running"));
            }
            inner.running = true;
        }
        let _guard = RunGuard { inner: &self.inner };

        match mode {
            RunMode::Default => {
                while self.inner.borrow().alive() {
                    self.turn(&RunMode::Default)?;
                }
                Ok(false)
            }
            mode => {
                if !self.inner.borrow().alive() {
                    return Ok(false);
                }
                self.turn(&mode)
            }
        }
    }

    /// One loop iteration: poll, timer phase, close phase.
    fn turn(&self, mode: &RunMode) -> Result<bool> {
        let timeout = match mode {
            RunMode::NoWait => Some(Duration::ZERO),
            _ => self.inner.borrow().poll_timeout(),
        };
        self.inner.borrow_mut().poller.poll(timeout)?;
        self.dispatch_timers();
        self.dispatch_closes();
        Ok(self.inner.borrow().alive())
    }

    /// Deliver every due timer tick. The due set is snapshotted up front:
    /// timers started by a callback in this batch first fire on a later
    /// iteration, and a stop or close from a callback suppresses any
    /// not-yet-delivered tick in the batch.
    fn dispatch_timers(&self) {
        let expired = {
            let mut inner = self.inner.borrow_mut();
            let now = Instant::now();
            inner.wheel.drain_expired(now)
        };
        for id in expired {
            let prepared = self.inner.borrow_mut().prepare_tick(id);
            let Some((mut callback, release)) = prepared else {
                continue;
            };
            drop(release);
            callback();
            let stale = self.inner.borrow_mut().finish_tick(id, callback);
            drop(stale);
        }
    }

    /// Complete pending closes: remove each slot from the table, then invoke
    /// its close callback. Closes requested by a close callback are drained
    /// in the same phase.
    fn dispatch_closes(&self) {
        loop {
            let entry = {
                let mut inner = self.inner.borrow_mut();
                match inner.closing.pop_front() {
                    Some(id) => Some(inner.slots.remove(&id)),
                    None => None,
                }
            };
            let Some(slot) = entry else {
                break;
            };
            let Some(mut slot) = slot else {
                continue;
            };
            let callback = slot.close_cb.take();
            drop(slot);
            if let Some(callback) = callback {
                callback();
            }
        }
    }
}

struct RunGuard<'a> {
    inner: &'a Rc<RefCell<LoopInner>>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.running = false;
        }
    }
}
