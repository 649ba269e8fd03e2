// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{self, Poll, Waker};
use std::time::Duration;

use super::{Context, Fiber, Step};
use crate::{AnyHandle, ClockReading, FiberId, Handle, Outcome, Scheduler, WaitCommand};

/// Creates a fiber from an `async` body.
///
/// The body receives a [`Suspender`] and suspends the fiber by awaiting its methods. Between
/// suspension points the body runs uninterrupted. Returning `Err` fails the fiber.
///
/// The body is polled with a no-op waker. A foreign future that returns [`Poll::Pending`] without
/// going through the suspender is polled again on the next tick.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{FiberError, Outcome, Scheduler, fiber};
///
/// let scheduler = Scheduler::new();
///
/// let handle = scheduler.run(fiber::from_async(|s| async move {
///     let child = s.scheduler().run_async(|s| async move {
///         s.sleep(Duration::from_millis(100)).await;
///         Err::<(), _>(FiberError::msg("master server unreachable"))
///     });
///
///     match s.wait_for(&child).await {
///         Outcome::Failed(error) => Ok(format!("gave up: {error}")),
///         _ => Ok("registered".to_owned()),
///     }
/// }));
///
/// for tick in 1..=20 {
///     scheduler.advance(tick, Duration::from_millis(16 * tick));
/// }
///
/// assert_eq!(
///     handle.outcome().and_then(|outcome| outcome.ok()).as_deref(),
///     Some("gave up: master server unreachable")
/// );
/// ```
pub fn from_async<T, F, Fut>(f: F) -> FromAsync<Fut>
where
    F: FnOnce(Suspender) -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let channel = Rc::new(Channel::default());
    let future = f(Suspender {
        channel: Rc::clone(&channel),
    });

    FromAsync {
        future: Box::pin(future),
        channel,
    }
}

/// A fiber created by [`from_async`].
pub struct FromAsync<Fut> {
    future: Pin<Box<Fut>>,
    channel: Rc<Channel>,
}

impl<T, Fut> Fiber for FromAsync<Fut>
where
    Fut: Future<Output = crate::Result<T>>,
{
    type Output = T;

    fn resume(&mut self, cx: &mut Context<'_>) -> Step<Self::Output> {
        let _entered = Entered::new(&self.channel, cx);
        let mut task_cx = task::Context::from_waker(Waker::noop());

        match self.future.as_mut().poll(&mut task_cx) {
            Poll::Ready(result) => Step::from(result),
            Poll::Pending => Step::Yield(self.channel.posted.take().unwrap_or(WaitCommand::NextTick)),
        }
    }
}

impl<Fut> fmt::Debug for FromAsync<Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromAsync").field("channel", &self.channel).finish_non_exhaustive()
    }
}

/// Carries wait commands out of the body and resumption context into it.
#[derive(Debug, Default)]
struct Channel {
    posted: RefCell<Option<WaitCommand>>,
    now: Cell<Option<ClockReading>>,
    id: Cell<Option<FiberId>>,
    scheduler: RefCell<Option<Scheduler>>,
}

/// Exposes the resumption context to the body for the duration of one poll.
///
/// The scheduler is only held while the body runs, so a suspended fiber does not keep its
/// scheduler alive.
struct Entered<'a> {
    channel: &'a Channel,
}

impl<'a> Entered<'a> {
    fn new(channel: &'a Channel, cx: &Context<'_>) -> Self {
        channel.now.set(cx.now());
        channel.id.set(Some(cx.id()));
        *channel.scheduler.borrow_mut() = Some(cx.scheduler().clone());

        Self { channel }
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        let scheduler = self.channel.scheduler.borrow_mut().take();
        drop(scheduler);
    }
}

/// The suspension interface of an `async` fiber body.
///
/// Every `async` method suspends the fiber at least once. Cloning is inexpensive; clones refer to
/// the same fiber and must only be used from within its body.
#[derive(Clone)]
pub struct Suspender {
    channel: Rc<Channel>,
}

impl Suspender {
    /// Suspends the fiber until `command` is ready.
    ///
    /// Only one wait can be live per fiber. Concurrently awaiting several suspensions inside the
    /// same body, for example through a `join` combinator, resumes on the one posted last.
    pub fn suspend(&self, command: impl Into<WaitCommand>) -> Suspend<'_> {
        Suspend {
            channel: &self.channel,
            command: Some(command.into()),
        }
    }

    /// Suspends the fiber until the next tick.
    pub fn next_tick(&self) -> Suspend<'_> {
        self.suspend(WaitCommand::NextTick)
    }

    /// Suspends the fiber for at least `duration` of elapsed time.
    pub fn sleep(&self, duration: Duration) -> Suspend<'_> {
        self.suspend(WaitCommand::ForDuration(duration))
    }

    /// Suspends the fiber until the fiber behind `handle` has terminated and returns its outcome.
    ///
    /// Always suspends, even if the fiber has already terminated.
    ///
    /// # Panics
    ///
    /// Panics if the outcome was moved out with [`Handle::take_outcome`] before the wait resumed.
    pub async fn wait_for<T>(&self, handle: &Handle<T>) -> Outcome<T>
    where
        T: Clone + 'static,
    {
        self.wait_until_finished(&handle.erase()).await;

        handle
            .outcome()
            .expect("the outcome of an awaited fiber is not taken before its waiter resumes")
    }

    /// Suspends the fiber until the fiber behind `handle` has terminated and moves its outcome
    /// out.
    ///
    /// Unlike [`wait_for`][Self::wait_for], the output does not need to be `Clone`.
    ///
    /// # Panics
    ///
    /// Panics if the outcome was moved out through another clone of the handle.
    pub async fn join<T: 'static>(&self, handle: Handle<T>) -> Outcome<T> {
        self.wait_until_finished(&handle.erase()).await;

        handle
            .take_outcome()
            .expect("the outcome of a joined fiber is not taken through another handle")
    }

    /// Suspends the fiber until every fiber in `handles` has terminated.
    ///
    /// Returns immediately for an empty slice. Otherwise suspends at least once.
    pub async fn wait_all(&self, handles: &[AnyHandle]) {
        let Some((first, rest)) = handles.split_first() else {
            return;
        };

        self.wait_until_finished(first).await;

        for handle in rest {
            while !handle.is_finished() {
                self.suspend(handle.as_wait()).await;
            }
        }
    }

    async fn wait_until_finished(&self, handle: &AnyHandle) {
        loop {
            self.suspend(handle.as_wait()).await;

            if handle.is_finished() {
                return;
            }
        }
    }

    /// The clock reading of the current resumption.
    ///
    /// `None` while the fiber is driven to its first suspension point outside of an
    /// [`advance`][Scheduler::advance] pass.
    #[must_use]
    pub fn now(&self) -> Option<ClockReading> {
        self.channel.now.get()
    }

    /// The scheduler resuming the fiber.
    ///
    /// # Panics
    ///
    /// Panics if called outside of the fiber's body.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        self.channel
            .scheduler
            .borrow()
            .clone()
            .expect("a suspender is only used from within the body of its fiber")
    }

    /// The identifier of the fiber.
    ///
    /// # Panics
    ///
    /// Panics if called before the fiber was submitted to a scheduler.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.channel
            .id
            .get()
            .expect("a suspender is only used from within the body of its fiber")
    }
}

impl fmt::Debug for Suspender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspender")
            .field("id", &self.channel.id.get())
            .field("now", &self.channel.now.get())
            .finish()
    }
}

/// The future returned by [`Suspender::suspend`] and its shorthands.
///
/// The first poll posts the wait command and returns [`Poll::Pending`]; the next poll, made when
/// the scheduler resumes the fiber, completes.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Suspend<'a> {
    channel: &'a Channel,
    command: Option<WaitCommand>,
}

impl Future for Suspend<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        match self.command.take() {
            Some(command) => {
                *self.channel.posted.borrow_mut() = Some(command);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}
