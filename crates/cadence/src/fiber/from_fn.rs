// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use super::{Context, Fiber, Step};

/// Creates a fiber from a closure that is called on every resumption.
///
/// The closure keeps its state in its captures, which makes it convenient for small explicit
/// state machines.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{Scheduler, Step, fiber};
///
/// let scheduler = Scheduler::new();
/// let mut pings = 0;
///
/// let handle = scheduler.run(fiber::from_fn(move |_cx| {
///     pings += 1;
///     if pings == 3 {
///         Step::Complete(pings)
///     } else {
///         Step::sleep(Duration::from_secs(1))
///     }
/// }));
///
/// for tick in 1..=10 {
///     scheduler.advance(tick, Duration::from_secs(tick));
/// }
///
/// assert_eq!(handle.outcome().and_then(|outcome| outcome.ok()), Some(3));
/// ```
pub fn from_fn<T, F>(f: F) -> FromFn<F>
where
    F: FnMut(&mut Context<'_>) -> Step<T>,
{
    FromFn { f }
}

/// A fiber created by [`from_fn`].
pub struct FromFn<F> {
    f: F,
}

impl<T, F> Fiber for FromFn<F>
where
    F: FnMut(&mut Context<'_>) -> Step<T>,
{
    type Output = T;

    fn resume(&mut self, cx: &mut Context<'_>) -> Step<Self::Output> {
        (self.f)(cx)
    }
}

impl<F> fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromFn").finish_non_exhaustive()
    }
}
