//! Loop driver behavior: run modes, termination, walk, close phase and
//! re-entrancy.

use eventide::{Error, EventLoop, LoopOptions};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn test_run_returns_after_single_tick() {
    let lp = EventLoop::new().unwrap();
    let timer = lp.timer().unwrap();

    let ticks = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&ticks);
    timer.start(1, 0, move || seen.set(seen.get() + 1)).unwrap();

    lp.run().unwrap();

    assert_eq!(ticks.get(), 1);
    assert!(!lp.alive());
}

#[test]
fn test_close_callback_is_asynchronous() {
    let lp = EventLoop::new().unwrap();
    let timer = lp.timer().unwrap();

    let closes = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&closes);
    timer.close_with(move || seen.set(seen.get() + 1)).unwrap();

    // Never synchronous from close_with; only run delivers it.
    assert_eq!(closes.get(), 0);
    assert!(lp.alive());

    lp.run().unwrap();
    assert_eq!(closes.get(), 1);
    assert!(!lp.alive());
}

#[test]
fn test_walk_tracks_open_and_closing_handles() {
    let lp = EventLoop::new().unwrap();
    let open = lp.timer().unwrap();
    let closed = lp.timer().unwrap();
    closed.close().unwrap();

    let mut seen = Vec::new();
    lp.walk(|view| seen.push((view.id, view.closing)));
    assert_eq!(seen, vec![(open.id(), false), (closed.id(), true)]);

    lp.run().unwrap();

    // The close completed, so only the open handle remains tracked.
    let mut seen = Vec::new();
    lp.walk(|view| seen.push(view.id));
    assert_eq!(seen, vec![open.id()]);
}

#[test]
fn test_walk_with_no_handles() {
    let lp = EventLoop::new().unwrap();
    let mut visits = 0;
    lp.walk(|_| visits += 1);
    assert_eq!(visits, 0);
}

#[test]
fn test_idle_timer_does_not_keep_loop_alive() {
    let lp = EventLoop::new().unwrap();
    let _timer = lp.timer().unwrap();

    assert!(!lp.alive());
    lp.run().unwrap();
}

#[test]
fn test_callback_can_start_new_handles() {
    let lp = Rc::new(EventLoop::new().unwrap());
    let first = lp.timer().unwrap();

    let ticks = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&ticks);
    let spawner = Rc::clone(&lp);
    first
        .start(0, 0, move || {
            seen.set(seen.get() + 1);
            let second = spawner.timer().unwrap();
            let seen = Rc::clone(&seen);
            second.start(0, 0, move || seen.set(seen.get() + 10)).unwrap();
        })
        .unwrap();

    lp.run().unwrap();

    // The handle started from inside a callback fired on a later iteration.
    assert_eq!(ticks.get(), 11);
}

#[test]
fn test_reentrant_run_fails() {
    let lp = Rc::new(EventLoop::new().unwrap());
    let timer = lp.timer().unwrap();

    let rejected = Rc::new(Cell::new(false));
    let seen = Rc::clone(&rejected);
    let reentrant = Rc::clone(&lp);
    timer
        .start(0, 0, move || {
            seen.set(matches!(reentrant.run(), Err(Error::InvalidState(_))));
        })
        .unwrap();

    lp.run().unwrap();
    assert!(rejected.get());
}

#[test]
fn test_run_nowait_steps_without_blocking() {
    let lp = EventLoop::new().unwrap();
    let timer = lp.timer().unwrap();

    let ticks = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&ticks);
    timer.start(0, 0, move || seen.set(seen.get() + 1)).unwrap();

    assert!(!lp.run_nowait().unwrap());
    assert_eq!(ticks.get(), 1);
    assert!(!lp.run_nowait().unwrap());
    assert_eq!(ticks.get(), 1);
}

#[test]
fn test_run_once_delivers_pending_tick() {
    let lp = EventLoop::new().unwrap();
    let timer = lp.timer().unwrap();

    let ticks = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&ticks);
    timer.start(10, 0, move || seen.set(seen.get() + 1)).unwrap();

    while lp.run_once().unwrap() {}
    assert_eq!(ticks.get(), 1);
}

#[test]
fn test_stats_reflect_loop_state() {
    let lp = EventLoop::new().unwrap();
    let timer = lp.timer().unwrap();

    timer.start(1_000, 0, || {}).unwrap();
    let stats = lp.stats();
    assert_eq!(stats.handles, 1);
    assert_eq!(stats.active_timers, 1);
    assert_eq!(stats.closing, 0);

    timer.close().unwrap();
    let stats = lp.stats();
    assert_eq!(stats.handles, 1);
    assert_eq!(stats.active_timers, 0);
    assert_eq!(stats.closing, 1);

    lp.run().unwrap();
    let stats = lp.stats();
    assert_eq!(stats.handles, 0);
    assert_eq!(stats.closing, 0);
}

#[test]
fn test_bounded_poll_wait_still_completes() {
    let lp = EventLoop::with_options(LoopOptions {
        event_capacity: 8,
        max_poll_wait: Some(Duration::from_millis(2)),
    })
    .unwrap();
    let timer = lp.timer().unwrap();

    let ticks = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&ticks);
    timer.start(10, 0, move || seen.set(seen.get() + 1)).unwrap();

    lp.run().unwrap();
    assert_eq!(ticks.get(), 1);
}

#[test]
fn test_close_requested_during_dispatch_completes_same_iteration() {
    let lp = EventLoop::new().unwrap();
    let timer = lp.timer().unwrap();

    let closes = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&closes);
    let closer = timer.clone();
    timer
        .start(0, 0, move || {
            let seen = Rc::clone(&seen);
            closer.close_with(move || seen.set(seen.get() + 1)).unwrap();
        })
        .unwrap();

    // A single blocking iteration covers both the tick and the close phase.
    lp.run_once().unwrap();
    assert_eq!(closes.get(), 1);
    assert!(!lp.alive());
}
