// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resumable computations and the adapters that build them.
//!
//! A [`Fiber`] is driven one step at a time by a [`Scheduler`]. Each call to
//! [`resume`][Fiber::resume] runs the fiber until it either yields a [`WaitCommand`] describing
//! when it wants to run again, or terminates. Fibers can be written in two ways:
//!
//! - As explicit state machines, by implementing [`Fiber`] or with [`from_fn`].
//! - As sequential `async` bodies with [`from_async`], suspending through a [`Suspender`].
//!
//! ```
//! use std::time::Duration;
//!
//! use cadence::{Scheduler, fiber};
//!
//! let scheduler = Scheduler::new();
//!
//! let handle = scheduler.run(fiber::from_async(|s| async move {
//!     s.next_tick().await;
//!     s.sleep(Duration::from_millis(50)).await;
//!     Ok(42)
//! }));
//!
//! let mut tick = 0;
//! while !handle.is_finished() {
//!     tick += 1;
//!     scheduler.advance(tick, Duration::from_millis(16 * tick));
//! }
//!
//! assert_eq!(handle.outcome().and_then(|outcome| outcome.ok()), Some(42));
//! ```

mod from_async;
mod from_fn;
mod stop_on;

pub use from_async::{FromAsync, Suspend, Suspender, from_async};
pub use from_fn::{FromFn, from_fn};
pub use stop_on::{FiberExt, StopOn};

use crate::{ClockReading, FiberError, FiberId, Handle, Scheduler, WaitCommand};

/// A resumable computation driven by a [`Scheduler`].
///
/// The scheduler calls [`resume`][Self::resume] once when the fiber is submitted and then once
/// every time the fiber's last [`WaitCommand`] becomes ready. After the fiber returns
/// [`Step::Complete`] or [`Step::Fail`] it is never resumed again.
///
/// Dropping a fiber is its cleanup path: a cancelled fiber is dropped by its scheduler without
/// being resumed.
pub trait Fiber {
    /// The value the fiber produces when it completes.
    type Output;

    /// Runs the fiber until its next suspension point or until it terminates.
    fn resume(&mut self, cx: &mut Context<'_>) -> Step<Self::Output>;
}

impl<F> Fiber for Box<F>
where
    F: Fiber + ?Sized,
{
    type Output = F::Output;

    fn resume(&mut self, cx: &mut Context<'_>) -> Step<Self::Output> {
        (**self).resume(cx)
    }
}

/// The result of resuming a fiber once.
#[derive(Debug)]
pub enum Step<T> {
    /// The fiber suspended until the wait command becomes ready.
    Yield(WaitCommand),

    /// The fiber finished with a value.
    Complete(T),

    /// The fiber failed.
    Fail(FiberError),
}

impl<T> Step<T> {
    /// Suspends until the next tick.
    #[must_use]
    pub const fn next_tick() -> Self {
        Self::Yield(WaitCommand::NextTick)
    }

    /// Suspends for at least the given elapsed time.
    #[must_use]
    pub const fn sleep(duration: std::time::Duration) -> Self {
        Self::Yield(WaitCommand::ForDuration(duration))
    }

    /// Suspends until the fiber behind the handle has terminated.
    #[must_use]
    pub fn wait_for<U: 'static>(handle: &Handle<U>) -> Self {
        Self::Yield(handle.as_wait())
    }

    /// Returns `true` if the fiber suspended.
    #[must_use]
    pub const fn is_yield(&self) -> bool {
        matches!(self, Self::Yield(_))
    }

    /// Maps the value of a completing step.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Self::Yield(command) => Step::Yield(command),
            Self::Complete(value) => Step::Complete(f(value)),
            Self::Fail(error) => Step::Fail(error),
        }
    }
}

impl<T> From<crate::Result<T>> for Step<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Complete(value),
            Err(error) => Self::Fail(error),
        }
    }
}

/// What a fiber can see while it is being resumed.
#[derive(Debug)]
pub struct Context<'a> {
    scheduler: &'a Scheduler,
    id: FiberId,
    now: Option<ClockReading>,
}

impl<'a> Context<'a> {
    pub(crate) const fn new(scheduler: &'a Scheduler, id: FiberId, now: Option<ClockReading>) -> Self {
        Self { scheduler, id, now }
    }

    /// The scheduler resuming the fiber.
    ///
    /// Fibers use it to start child fibers on the same scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &'a Scheduler {
        self.scheduler
    }

    /// The identifier of the fiber being resumed.
    #[must_use]
    pub const fn id(&self) -> FiberId {
        self.id
    }

    /// The clock reading of the pass resuming the fiber.
    ///
    /// `None` when the fiber is being driven to its first suspension point outside of an
    /// [`advance`][Scheduler::advance] pass.
    #[must_use]
    pub const fn now(&self) -> Option<ClockReading> {
        self.now
    }
}
