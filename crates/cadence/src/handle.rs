// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::{FiberError, FiberId, WaitCommand};

/// The lifecycle state of a fiber.
///
/// A fiber starts [`Pending`][Self::Pending], is [`Running`][Self::Running] while the scheduler
/// resumes it and [`Suspended`][Self::Suspended] between resumptions. It ends in exactly one of
/// the terminal states. The first terminal state reached is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiberState {
    /// Submitted but not resumed yet.
    Pending,

    /// Being resumed right now.
    Running,

    /// Waiting for its wait command to become ready.
    Suspended,

    /// Finished and produced a value.
    Completed,

    /// Finished with an error or a panic.
    Failed,

    /// Called off through its handle or by the scheduler shutting down.
    Cancelled,
}

impl FiberState {
    /// Returns `true` for [`Completed`][Self::Completed], [`Failed`][Self::Failed] and
    /// [`Cancelled`][Self::Cancelled].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns the state name as a static string, for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FiberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fiber terminated.
///
/// Awaiting a fiber never re-raises its failure: the outcome is delivered as a value and the
/// awaiting code decides what to do with it.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The fiber finished and produced a value.
    Completed(T),

    /// The fiber failed.
    Failed(FiberError),

    /// The fiber was cancelled.
    Cancelled,
}

impl<T> Outcome<T> {
    /// The terminal state matching this outcome.
    #[must_use]
    pub const fn state(&self) -> FiberState {
        match self {
            Self::Completed(_) => FiberState::Completed,
            Self::Failed(_) => FiberState::Failed,
            Self::Cancelled => FiberState::Cancelled,
        }
    }

    /// Returns `true` if the fiber completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns `true` if the fiber failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns `true` if the fiber was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the value of a completed fiber.
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed(_) | Self::Cancelled => None,
        }
    }

    /// Returns the error of a failed fiber.
    #[must_use]
    pub const fn error(&self) -> Option<&FiberError> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Completed(_) | Self::Cancelled => None,
        }
    }

    /// Maps the value of a completed fiber.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Completed(value) => Outcome::Completed(f(value)),
            Self::Failed(error) => Outcome::Failed(error),
            Self::Cancelled => Outcome::Cancelled,
        }
    }

    /// Converts the outcome into a result, so that a failure can be propagated with `?`.
    ///
    /// Cancellation becomes an error for which [`FiberError::is_cancelled`] returns `true`.
    ///
    /// # Errors
    ///
    /// Returns the fiber's error if it failed, or a cancellation error if it was cancelled.
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(error) => Err(error),
            Self::Cancelled => Err(FiberError::cancelled()),
        }
    }
}

/// State shared between a running fiber and every handle to it.
pub(crate) struct Shared<T> {
    id: FiberId,
    state: Cell<FiberState>,
    slot: RefCell<Option<Outcome<T>>>,
}

impl<T> Shared<T> {
    pub(crate) const fn new(id: FiberId) -> Self {
        Self {
            id,
            state: Cell::new(FiberState::Pending),
            slot: RefCell::new(None),
        }
    }

    /// Records the terminal outcome. Returns `false` if the fiber had already terminated.
    pub(crate) fn settle(&self, outcome: Outcome<T>) -> bool {
        if self.state.get().is_terminal() {
            return false;
        }

        self.state.set(outcome.state());
        *self.slot.borrow_mut() = Some(outcome);
        true
    }
}

/// The untyped view of a fiber's shared state.
pub(crate) trait Observe {
    fn id(&self) -> FiberId;

    fn state(&self) -> FiberState;

    /// Ignored once the fiber has terminated.
    fn set_state(&self, state: FiberState);

    fn fail(&self, error: FiberError) -> bool;

    fn cancel(&self) -> bool;
}

impl<T> Observe for Shared<T> {
    fn id(&self) -> FiberId {
        self.id
    }

    fn state(&self) -> FiberState {
        self.state.get()
    }

    fn set_state(&self, state: FiberState) {
        if !self.state.get().is_terminal() {
            self.state.set(state);
        }
    }

    fn fail(&self, error: FiberError) -> bool {
        self.settle(Outcome::Failed(error))
    }

    fn cancel(&self) -> bool {
        let cancelled = self.settle(Outcome::Cancelled);

        if cancelled {
            tracing::event!(
                name: "cadence.fiber.cancelled",
                tracing::Level::TRACE,
                fiber.id = self.id.as_u64(),
            );
        }

        cancelled
    }
}

/// A handle to a fiber submitted to a [`Scheduler`][crate::Scheduler].
///
/// Handles observe the fiber's lifecycle and can cancel it. Cloning is inexpensive and every
/// clone refers to the same fiber. A handle may outlive its fiber; it then keeps reporting the
/// fiber's terminal state.
///
/// Dropping a handle does not cancel the fiber.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{FiberState, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let handle = scheduler.run_async(|s| async move {
///     s.sleep(Duration::from_secs(30)).await;
///     Ok(())
/// });
///
/// assert_eq!(handle.state(), FiberState::Suspended);
/// assert!(handle.cancel());
/// assert!(!handle.cancel());
/// assert_eq!(handle.state(), FiberState::Cancelled);
/// ```
pub struct Handle<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Handle<T> {
    pub(crate) const fn new(shared: Rc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// The identifier of the fiber.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.shared.id
    }

    /// The current lifecycle state of the fiber.
    #[must_use]
    pub fn state(&self) -> FiberState {
        self.shared.state.get()
    }

    /// Returns `true` once the fiber has reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Cancels the fiber.
    ///
    /// The fiber is marked [`Cancelled`][FiberState::Cancelled] immediately and is never resumed
    /// again. Its computation is dropped by the scheduler on the next
    /// [`advance`][crate::Scheduler::advance] pass, which runs any cleanup the computation
    /// performs in `Drop`. Fibers the cancelled fiber has started are not cancelled.
    ///
    /// Returns `true` if this call cancelled the fiber and `false` if it had already terminated.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Returns a copy of the terminal outcome, or `None` while the fiber is still running.
    ///
    /// Also returns `None` after the value has been moved out with
    /// [`take_outcome`][Self::take_outcome].
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome<T>>
    where
        T: Clone,
    {
        self.shared.slot.borrow().clone()
    }

    /// Moves the terminal outcome out of the handle, or returns `None` while the fiber is still
    /// running.
    ///
    /// Only the first call after termination returns the outcome; the state keeps reporting the
    /// terminal state afterwards.
    #[must_use]
    pub fn take_outcome(&self) -> Option<Outcome<T>> {
        self.shared.slot.borrow_mut().take()
    }

    /// Returns a wait command that resumes once this fiber has terminated.
    #[must_use]
    pub fn as_wait(&self) -> WaitCommand
    where
        T: 'static,
    {
        WaitCommand::from(self)
    }

    /// Returns a type-erased handle to the same fiber.
    #[must_use]
    pub fn erase(&self) -> AnyHandle
    where
        T: 'static,
    {
        AnyHandle {
            inner: Rc::clone(&self.shared) as Rc<dyn Observe>,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

/// A type-erased [`Handle`].
///
/// Allows observing and cancelling fibers with different output types through a single type,
/// for example to await a group of them.
#[derive(Clone)]
pub struct AnyHandle {
    inner: Rc<dyn Observe>,
}

impl AnyHandle {
    /// The identifier of the fiber.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.inner.id()
    }

    /// The current lifecycle state of the fiber.
    #[must_use]
    pub fn state(&self) -> FiberState {
        self.inner.state()
    }

    /// Returns `true` once the fiber has reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Cancels the fiber. See [`Handle::cancel`].
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// Returns a wait command that resumes once this fiber has terminated.
    #[must_use]
    pub fn as_wait(&self) -> WaitCommand {
        WaitCommand::UntilHandleCompletes(self.clone())
    }
}

impl<T: 'static> From<Handle<T>> for AnyHandle {
    fn from(handle: Handle<T>) -> Self {
        handle.erase()
    }
}

impl<T: 'static> From<&Handle<T>> for AnyHandle {
    fn from(handle: &Handle<T>) -> Self {
        handle.erase()
    }
}

impl fmt::Debug for AnyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
