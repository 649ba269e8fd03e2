// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Timeouts, retries and periodic work built from the scheduler primitives.
//!
//! Nothing here needs support from the scheduler itself: each helper is an ordinary fiber, or an
//! `async` function to be awaited inside one, that composes wait commands and handles.

use std::cell::Cell;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::Duration;

use crate::fiber::{self, Context, Fiber, Step, Suspender};
use crate::{Handle, Outcome};

/// The error returned by [`with_timeout`] when the fiber did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("fiber did not finish within {limit:?}")]
pub struct Elapsed {
    limit: Duration,
}

impl Elapsed {
    /// The time limit that was exceeded.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }
}

/// Waits for the fiber behind `handle`, cancelling it if it runs longer than `limit`.
///
/// A watchdog fiber is started on the calling fiber's scheduler. It sleeps for `limit` and then
/// cancels the target if it is still running. The limit is therefore measured against the
/// calling fiber's clock, even when the target runs on another scheduler. When the target wins,
/// the watchdog is cancelled. It is also cancelled when the calling fiber is cancelled while it
/// waits, so an abandoned race never cancels the target.
///
/// # Errors
///
/// Returns [`Elapsed`] if the watchdog cancelled the target.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{Scheduler, compose};
///
/// let scheduler = Scheduler::new();
///
/// let handle = scheduler.run_async(|s| async move {
///     let nat_punch = s.scheduler().run_async(|s| async move {
///         s.sleep(Duration::from_secs(10)).await;
///         Ok(())
///     });
///
///     Ok(compose::with_timeout(&s, &nat_punch, Duration::from_secs(2)).await.is_err())
/// });
///
/// for tick in 1..=40 {
///     scheduler.advance(tick, Duration::from_millis(100 * tick));
/// }
///
/// assert_eq!(handle.outcome().and_then(|outcome| outcome.ok()), Some(true));
/// ```
pub async fn with_timeout<T>(s: &Suspender, handle: &Handle<T>, limit: Duration) -> Result<Outcome<T>, Elapsed>
where
    T: Clone + 'static,
{
    let expired = Rc::new(Cell::new(false));

    let watchdog = {
        let target = handle.erase();
        let expired = Rc::clone(&expired);

        Watchdog(s.scheduler().run_async(move |w| async move {
            w.sleep(limit).await;

            if target.cancel() {
                expired.set(true);

                tracing::event!(
                    name: "cadence.compose.timeout",
                    tracing::Level::DEBUG,
                    fiber.id = target.id().as_u64(),
                    timeout = limit.as_secs_f32(),
                );
            }

            Ok(())
        }))
    };

    let outcome = s.wait_for(handle).await;
    drop(watchdog);

    if expired.get() { Err(Elapsed { limit }) } else { Ok(outcome) }
}

/// Cancels the watchdog of [`with_timeout`] once its caller stops waiting, including when the
/// caller's computation is dropped.
struct Watchdog(Handle<()>);

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Runs a fiber produced by `factory` until it completes, up to `attempts` times.
///
/// Each attempt is started on the calling fiber's scheduler and receives its zero-based index.
/// After a failed attempt the caller sleeps for `backoff` before the next one. A cancelled attempt
/// is not retried. An `attempts` of zero is treated as one.
///
/// Returns the outcome of the first attempt that did not fail, or the failure of the last one.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{FiberError, Scheduler, Step, compose, fiber};
///
/// let scheduler = Scheduler::new();
///
/// let registration = scheduler.run_async(|s| async move {
///     let outcome = compose::retry(&s, 3, Duration::from_millis(500), |attempt| {
///         fiber::from_fn(move |_cx| {
///             if attempt < 2 {
///                 Step::Fail(FiberError::msg("master server busy"))
///             } else {
///                 Step::Complete(attempt)
///             }
///         })
///     })
///     .await;
///
///     outcome.into_result()
/// });
///
/// for tick in 1..=20 {
///     scheduler.advance(tick, Duration::from_millis(100 * tick));
/// }
///
/// assert_eq!(registration.outcome().and_then(|outcome| outcome.ok()), Some(2));
/// ```
pub async fn retry<T, F, Fib>(s: &Suspender, attempts: u32, backoff: Duration, mut factory: F) -> Outcome<T>
where
    F: FnMut(u32) -> Fib,
    Fib: Fiber<Output = T> + 'static,
    T: 'static,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        let child = s.scheduler().run(factory(attempt));
        let outcome = s.join(child).await;
        attempt += 1;

        match outcome {
            Outcome::Failed(_) if attempt < attempts => {
                tracing::event!(
                    name: "cadence.compose.retry",
                    tracing::Level::DEBUG,
                    fiber.id = s.id().as_u64(),
                    attempt.index = attempt,
                    retry.delay = backoff.as_secs_f32(),
                );

                s.sleep(backoff).await;
            }
            outcome => return outcome,
        }
    }
}

/// Creates a fiber that calls `body` immediately and then once per `period` until it breaks.
///
/// The period is measured in elapsed time, so the rate stays correct when ticks have variable
/// length. Each call happens no earlier than `period` after the previous one, and no later than
/// the first pass after that.
///
/// # Examples
///
/// ```
/// use std::ops::ControlFlow;
/// use std::time::Duration;
///
/// use cadence::{Scheduler, compose};
///
/// let scheduler = Scheduler::new();
/// let mut pings = 0;
///
/// let pinger = scheduler.run(compose::every(Duration::from_secs(1), move |_cx| {
///     pings += 1;
///     if pings == 3 { ControlFlow::Break(pings) } else { ControlFlow::Continue(()) }
/// }));
///
/// for tick in 1..=5 {
///     scheduler.advance(tick, Duration::from_secs(tick));
/// }
///
/// assert_eq!(pinger.outcome().and_then(|outcome| outcome.ok()), Some(3));
/// ```
pub fn every<B, F>(period: Duration, mut body: F) -> impl Fiber<Output = B>
where
    F: FnMut(&mut Context<'_>) -> ControlFlow<B>,
{
    fiber::from_fn(move |cx| match body(cx) {
        ControlFlow::Continue(()) => Step::sleep(period),
        ControlFlow::Break(value) => Step::Complete(value),
    })
}
