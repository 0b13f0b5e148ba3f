//! Benchmarks for timer scheduling and a full start-run-tick cycle.

use criterion::{criterion_group, criterion_main, Criterion};
use eventide::EventLoop;

fn bench_timer_arm_disarm(c: &mut Criterion) {
    let lp = EventLoop::new().unwrap();
    let timer = lp.timer().unwrap();

    c.bench_function("timer_arm_disarm", |b| {
        b.iter(|| {
            timer.start(1_000, 0, || {}).unwrap();
            timer.stop().unwrap();
        })
    });
}

fn bench_oneshot_burst(c: &mut Criterion) {
    c.bench_function("oneshot_burst_64", |b| {
        b.iter(|| {
            let lp = EventLoop::new().unwrap();
            let timers: Vec<_> = (0..64).map(|_| lp.timer().unwrap()).collect();
            for timer in &timers {
                timer.start(0, 0, || {}).unwrap();
            }
            lp.run().unwrap();
        })
    });
}

criterion_group!(benches, bench_timer_arm_disarm, bench_oneshot_burst);
criterion_main!(benches);
