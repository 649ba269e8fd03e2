// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![expect(missing_docs, reason = "Benchmark code")]

//! Measures the cost of one scheduler pass. The scenarios:
//! * Every fiber resumes on every pass
//! * Every fiber sleeps, so a pass only evaluates waits
//! * Every fiber is an `async` body that resumes on every pass
//! * Fibers are submitted, resumed and reaped within a few passes

use std::hint::black_box;
use std::time::Duration;

use cadence::{Scheduler, Step, fiber};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

const FIBER_COUNTS: [usize; 3] = [10, 100, 1_000];

fn criterion_benchmark(c: &mut Criterion) {
    resume_all(c);
    evaluate_only(c);
    resume_async(c);
    churn(c);
}

fn resume_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("resume_all");

    for count in FIBER_COUNTS {
        let scheduler = Scheduler::builder().with_capacity(count).build();
        let _handles: Vec<_> = (0..count)
            .map(|_| scheduler.run(fiber::from_fn(|_cx| Step::<()>::next_tick())))
            .collect();

        let mut tick = 0;
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                tick += 1;
                black_box(scheduler.advance(tick, Duration::ZERO));
            });
        });
    }

    group.finish();
}

fn evaluate_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_only");

    for count in FIBER_COUNTS {
        let scheduler = Scheduler::builder().with_capacity(count).build();
        let _handles: Vec<_> = (0..count)
            .map(|_| scheduler.run(fiber::from_fn(|_cx| Step::<()>::sleep(Duration::MAX))))
            .collect();

        let mut tick = 0;
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                tick += 1;
                black_box(scheduler.advance(tick, Duration::ZERO));
            });
        });
    }

    group.finish();
}

fn resume_async(c: &mut Criterion) {
    let mut group = c.benchmark_group("resume_async");

    for count in FIBER_COUNTS {
        let scheduler = Scheduler::builder().with_capacity(count).build();
        let _handles: Vec<_> = (0..count)
            .map(|_| {
                scheduler.run_async(|s| async move {
                    for _ in 0..u64::MAX {
                        s.next_tick().await;
                    }
                    Ok(())
                })
            })
            .collect();

        let mut tick = 0;
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                tick += 1;
                black_box(scheduler.advance(tick, Duration::ZERO));
            });
        });
    }

    group.finish();
}

fn churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");

    let scheduler = Scheduler::new();
    let mut tick = 0;

    group.bench_function("submit_resume_reap", |b| {
        b.iter(|| {
            let handle = scheduler.run(fiber::from_fn(|cx| match cx.now() {
                None => Step::next_tick(),
                Some(now) => Step::Complete(now.tick()),
            }));

            tick += 1;
            scheduler.advance(tick, Duration::ZERO);
            tick += 1;
            scheduler.advance(tick, Duration::ZERO);

            black_box(handle.take_outcome())
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = criterion_benchmark
}

criterion_main!(benches);
