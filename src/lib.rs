//! Eventide - embeddable callback-driven event loop
//!
//! Gives a scripting runtime (or any embedder) a small set of handle
//! objects over native asynchronous resources, with an explicit lifecycle
//! bridging the embedder's nondeterministic object lifetimes and the loop's
//! manually-released native state. Timers are the fully-wired handle kind;
//! every future kind (streams, pipes, TTYs, filesystem requests) extends
//! the same handle base.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         EVENT LOOP                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Poller: OS blocking primitive (epoll / kqueue)                 │
//! │  TimerWheel: deadlines for active timers, poll timeout source   │
//! │  Handle table: kind tag + inline native state + close latch     │
//! │  Bridge: typed callback slots, take → invoke → restore          │
//! │  Driver: poll → timer phase → close phase, until nothing alive  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! Handles are cloneable tokens ([`Handle`], [`Timer`]). The loop owns the
//! native state; tokens reference it. Explicit [`Handle::close`] releases
//! the native resource and completes asynchronously on the next loop
//! iteration. A handle whose tokens are all dropped without a close is
//! force-closed by a finalizer instead, so the loop never holds dangling
//! state. While a tick callback is registered the loop itself keeps the
//! handle alive, mirroring how a callback registration roots the handle in
//! a collected runtime.
//!
//! # Usage
//!
//! ```
//! use eventide::EventLoop;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let lp = EventLoop::new()?;
//! let timer = lp.timer()?;
//!
//! let ticks = Rc::new(Cell::new(0u32));
//! let seen = Rc::clone(&ticks);
//! timer.start(0, 0, move || seen.set(seen.get() + 1))?;
//!
//! lp.run()?;
//! assert_eq!(ticks.get(), 1);
//! # Ok::<(), eventide::Error>(())
//! ```
//!
//! The loop is single-threaded and callbacks run only from inside
//! [`EventLoop::run`] (or its single-iteration variants), never
//! concurrently with embedder code.

mod bridge;
mod error;
mod event_loop;
mod handle;
mod poller;
mod timer;
mod wheel;

pub use error::{Error, Result};
pub use event_loop::{EventLoop, HandleView, LoopOptions, LoopStats};
pub use handle::{Handle, HandleId, HandleKind};
pub use timer::Timer;
