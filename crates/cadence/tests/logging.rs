// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured events emitted by schedulers and the composition helpers.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence::{FiberError, Scheduler, Step, compose, fiber};
use tracing_subscriber::fmt::MakeWriter;

/// Captures formatted log output into a buffer that can be inspected by the test.
#[derive(Debug, Clone, Default)]
struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
    }

    fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "log output does not contain '{expected}', got:\n{output}"
        );
    }

    fn assert_not_contains(&self, unexpected: &str) {
        let output = self.output();
        assert!(
            !output.contains(unexpected),
            "log output unexpectedly contains '{unexpected}', got:\n{output}"
        );
    }

    fn subscriber(&self) -> impl tracing::Subscriber {
        use tracing_subscriber::layer::SubscriberExt;
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn pass_reports_scheduler_and_counts() {
    let capture = LogCapture::default();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let scheduler = Scheduler::builder().with_name("presentation").build();
    let _waiting = scheduler.run(fiber::from_fn(|_cx| Step::<()>::next_tick()));

    scheduler.advance(1, Duration::from_millis(16));
    scheduler.advance(2, Duration::from_millis(32));

    capture.assert_contains("DEBUG");
    capture.assert_contains("scheduler.name=presentation");
    capture.assert_contains("tick=2");
    capture.assert_contains("fibers.resumed=1");
    capture.assert_contains("fibers.live=1");
}

#[test]
fn fiber_lifecycle_is_traced() {
    let capture = LogCapture::default();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let scheduler = Scheduler::builder().with_name("simulation").build();
    let handle = scheduler.run(fiber::from_fn(|cx| match cx.now() {
        None => Step::next_tick(),
        Some(_) => Step::Complete(()),
    }));

    scheduler.advance(1, Duration::from_millis(20));
    scheduler.advance(2, Duration::from_millis(40));

    capture.assert_contains("TRACE");
    capture.assert_contains(&format!("fiber.id={}", handle.id().as_u64()));
    capture.assert_contains("fiber.state=\"completed\"");
    capture.assert_contains("fibers.reaped=1");
}

#[test]
fn duplicate_tick_is_reported() {
    let capture = LogCapture::default();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let scheduler = Scheduler::builder().with_name("presentation").build();
    scheduler.advance(4, Duration::from_millis(64));

    let before = capture.output().lines().count();
    let sweep = scheduler.advance(4, Duration::from_millis(64));

    assert!(sweep.is_skipped());
    let output = capture.output();
    let reported: Vec<_> = output.lines().skip(before).collect();
    assert_eq!(reported.len(), 1, "{output}");
    assert!(reported[0].contains("tick=4"));
}

#[test]
fn shutdown_reports_cancelled_fibers() {
    let capture = LogCapture::default();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let scheduler = Scheduler::builder().with_name("lobby").build();
    let _first = scheduler.run(fiber::from_fn(|_cx| Step::<()>::sleep(Duration::from_secs(5))));
    let _second = scheduler.run(fiber::from_fn(|_cx| Step::<()>::sleep(Duration::from_secs(5))));

    scheduler.shutdown();

    capture.assert_contains("scheduler.name=lobby");
    capture.assert_contains("fibers.cancelled=2");
}

#[test]
fn fiber_errors_are_not_logged() {
    let capture = LogCapture::default();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let scheduler = Scheduler::new();
    let handle = scheduler.run(fiber::from_fn(|cx| match cx.now() {
        None => Step::<()>::next_tick(),
        Some(_) => Step::Fail(FiberError::msg("session token 7f3a expired")),
    }));

    scheduler.advance(1, Duration::from_millis(16));
    scheduler.advance(2, Duration::from_millis(32));

    assert!(handle.outcome().is_some_and(|outcome| outcome.is_failed()));
    capture.assert_contains("fiber.state=\"failed\"");
    capture.assert_not_contains("7f3a");
}

#[test]
fn retry_reports_each_attempt() {
    let capture = LogCapture::default();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let scheduler = Scheduler::new();
    let handle = scheduler.run_async(|s| async move {
        let outcome = compose::retry(&s, 3, Duration::from_millis(100), |_attempt| {
            fiber::from_fn(|_cx| Step::<()>::Fail(FiberError::msg("refused")))
        })
        .await;

        Ok(outcome.is_failed())
    });

    for tick in 1..=20 {
        scheduler.advance(tick, Duration::from_millis(50 * tick));
    }

    assert_eq!(handle.outcome().and_then(|outcome| outcome.ok()), Some(true));
    capture.assert_contains("attempt.index=1");
    capture.assert_contains("attempt.index=2");
    capture.assert_not_contains("attempt.index=3");
}
