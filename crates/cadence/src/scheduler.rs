// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

use crate::fiber::{self, Context, Fiber, Step, Suspender};
use crate::handle::{Observe, Shared};
use crate::wait::PendingWait;
use crate::{
    Clock, ClockReading, FiberError, FiberId, FiberState, Handle, Outcome, PanicPolicy, SchedulerBuilder, WaitCommand,
};

/// Drives fibers against one clock.
///
/// The host calls [`advance`][Self::advance] (or [`update`][Self::update]) once per logical
/// update. Each pass resumes every fiber whose wait command is ready, once, in the order the
/// fibers were submitted, and then releases the fibers that have terminated.
///
/// Cloning is inexpensive; clones refer to the same scheduler. Fibers usually reach their
/// scheduler through [`Context::scheduler`] or [`Suspender::scheduler`] instead.
///
/// # Ordering
///
/// - A fiber is driven to its first suspension point inside [`run`][Self::run] and is never
///   resumed a second time in the pass that submitted it.
/// - Within a pass, fibers resume in submission order.
/// - A wait never becomes ready in the pass that issued it. A wait issued between passes, for
///   example by a fiber the host submitted between frames, is measured from the last pass, or
///   from the first pass if none has run yet.
/// - A fiber waiting for another fiber resumes in a pass strictly after the one in which the
///   awaited fiber terminated.
///
/// # Lifetime
///
/// Fibers that hold a clone of their scheduler keep it alive until they finish. Call
/// [`shutdown`][Self::shutdown] to cancel every fiber and break such cycles.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{ManualClock, Scheduler};
///
/// let clock = ManualClock::new();
/// let scheduler = Scheduler::new();
///
/// let handle = scheduler.run_async(|s| async move {
///     s.next_tick().await;
///     Ok("joined")
/// });
///
/// clock.advance(Duration::ZERO);
/// scheduler.update(&clock);
/// assert!(!handle.is_finished());
///
/// clock.advance(Duration::from_millis(16));
/// scheduler.update(&clock);
/// assert_eq!(handle.outcome().and_then(|outcome| outcome.ok()), Some("joined"));
/// ```
#[derive(Clone)]
pub struct Scheduler {
    core: Rc<Core>,
}

struct Core {
    name: Cow<'static, str>,
    panic_policy: PanicPolicy,
    fibers: RefCell<Vec<Rc<Entry>>>,
    last_tick: Cell<Option<u64>>,
    last_elapsed: Cell<Duration>,
    in_flight: Cell<Option<ClockReading>>,
    shut_down: Cell<bool>,
}

/// One tracked fiber.
struct Entry {
    id: FiberId,
    observer: Rc<dyn Observe>,
    task: RefCell<Option<Box<dyn Task>>>,
    wait: RefCell<Option<PendingWait>>,
}

impl Entry {
    fn is_terminal(&self) -> bool {
        self.observer.state().is_terminal()
    }

    fn is_eligible(&self, now: ClockReading) -> bool {
        !self.is_terminal() && self.wait.borrow_mut().as_mut().is_some_and(|wait| wait.is_ready(now))
    }

    /// Drops the computation. Must not be called while any borrow of the fiber list is held.
    fn release(&self) {
        let task = self.task.borrow_mut().take();
        let wait = self.wait.borrow_mut().take();
        drop(task);
        drop(wait);
    }
}

/// A fiber bound to the shared state its handles observe.
trait Task {
    fn resume(&mut self, cx: &mut Context<'_>) -> Resumed;
}

enum Resumed {
    Yielded(WaitCommand),
    Finished,
}

struct Bound<F: Fiber> {
    fiber: F,
    shared: Rc<Shared<F::Output>>,
}

impl<F: Fiber> Task for Bound<F> {
    fn resume(&mut self, cx: &mut Context<'_>) -> Resumed {
        self.shared.set_state(FiberState::Running);

        match self.fiber.resume(cx) {
            // The fiber cancelled itself while running.
            Step::Yield(_) if self.shared.state().is_terminal() => Resumed::Finished,
            Step::Yield(command) => {
                self.shared.set_state(FiberState::Suspended);
                Resumed::Yielded(command)
            }
            Step::Complete(value) => {
                self.shared.settle(Outcome::Completed(value));
                Resumed::Finished
            }
            Step::Fail(error) => {
                self.shared.settle(Outcome::Failed(error));
                Resumed::Finished
            }
        }
    }
}

/// Marks a pass as in flight for as long as it lives, including while unwinding.
struct Pass<'a> {
    core: &'a Core,
}

impl<'a> Pass<'a> {
    fn enter(core: &'a Core, now: ClockReading) -> Self {
        core.in_flight.set(Some(now));
        Self { core }
    }
}

impl Drop for Pass<'_> {
    fn drop(&mut self) {
        self.core.in_flight.set(None);
    }
}

/// A summary of one [`advance`][Scheduler::advance] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    tick: u64,
    resumed: usize,
    reaped: usize,
    skipped: bool,
}

impl Sweep {
    const fn skipped(tick: u64) -> Self {
        Self {
            tick,
            resumed: 0,
            reaped: 0,
            skipped: true,
        }
    }

    /// The tick the pass was called with.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// How many fibers were resumed.
    #[must_use]
    pub const fn resumed(&self) -> usize {
        self.resumed
    }

    /// How many terminated fibers were released.
    #[must_use]
    pub const fn reaped(&self) -> usize {
        self.reaped
    }

    /// Returns `true` if the pass did nothing because the tick had already been processed or the
    /// scheduler was shut down.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        self.skipped
    }
}

impl Scheduler {
    /// Creates a scheduler with default settings.
    #[must_use]
    pub fn new() -> Self {
        SchedulerBuilder::new().build()
    }

    /// Returns a builder to configure a scheduler.
    #[must_use]
    pub const fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_builder(builder: SchedulerBuilder) -> Self {
        Self {
            core: Rc::new(Core {
                name: builder.name,
                panic_policy: builder.panic_policy,
                fibers: RefCell::new(Vec::with_capacity(builder.capacity)),
                last_tick: Cell::new(None),
                last_elapsed: Cell::new(Duration::ZERO),
                in_flight: Cell::new(None),
                shut_down: Cell::new(false),
            }),
        }
    }

    /// The name given to the scheduler when it was built.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The number of fibers the scheduler currently tracks.
    ///
    /// Fibers that terminated since the last pass are counted until that pass releases them.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.fibers.borrow().len()
    }

    /// Returns `true` if the scheduler tracks no fibers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.fibers.borrow().is_empty()
    }

    /// The tick of the last pass that ran, if any.
    #[must_use]
    pub fn last_tick(&self) -> Option<u64> {
        self.core.last_tick.get()
    }

    /// Returns `true` once [`shutdown`][Self::shutdown] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.core.shut_down.get()
    }

    /// Submits a fiber and drives it to its first suspension point before returning.
    ///
    /// When called from inside a fiber during a pass, the new fiber's first wait is measured from
    /// that pass and the fiber is not resumed again in it.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler has been shut down. Also panics if the fiber panics while
    /// [`PanicPolicy::Propagate`] is in effect.
    pub fn run<F>(&self, fiber: F) -> Handle<F::Output>
    where
        F: Fiber + 'static,
        F::Output: 'static,
    {
        assert!(
            !self.core.shut_down.get(),
            "cannot run a fiber on scheduler '{}' after it was shut down",
            self.core.name
        );

        let id = FiberId::next();
        let shared = Rc::new(Shared::new(id));
        let entry = Rc::new(Entry {
            id,
            observer: Rc::clone(&shared) as Rc<dyn Observe>,
            task: RefCell::new(Some(Box::new(Bound {
                fiber,
                shared: Rc::clone(&shared),
            }))),
            wait: RefCell::new(None),
        });

        self.core.fibers.borrow_mut().push(Rc::clone(&entry));

        tracing::event!(
            name: "cadence.fiber.submitted",
            tracing::Level::TRACE,
            scheduler.name = %self.core.name,
            fiber.id = id.as_u64(),
            tick = self.core.in_flight.get().map(|now| now.tick()),
        );

        let now = self.core.in_flight.get();
        self.drive(&entry, now, now.or_else(|| self.core.last_reading()));

        if entry.is_terminal() {
            self.core.fibers.borrow_mut().retain(|tracked| !Rc::ptr_eq(tracked, &entry));
            entry.release();
        }

        Handle::new(shared)
    }

    /// Submits an `async` fiber body. Shorthand for `run(fiber::from_async(f))`.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler has been shut down.
    pub fn run_async<T, F, Fut>(&self, f: F) -> Handle<T>
    where
        F: FnOnce(Suspender) -> Fut,
        Fut: Future<Output = crate::Result<T>> + 'static,
        T: 'static,
    {
        self.run(fiber::from_async(f))
    }

    /// Runs one pass at the given tick and elapsed time.
    ///
    /// Does nothing if `tick` equals the tick of the previous pass, or if the scheduler has been
    /// shut down.
    ///
    /// # Panics
    ///
    /// Panics if `tick` or `elapsed` is lower than in the previous pass, or if called from inside
    /// one of this scheduler's fibers. Also panics if a fiber panics while
    /// [`PanicPolicy::Propagate`] is in effect.
    pub fn advance(&self, tick: u64, elapsed: Duration) -> Sweep {
        let core = &*self.core;

        assert!(
            core.in_flight.get().is_none(),
            "advance called on scheduler '{}' from inside one of its own fibers",
            core.name
        );

        if core.shut_down.get() {
            return Sweep::skipped(tick);
        }

        if let Some(last_tick) = core.last_tick.get() {
            assert!(
                tick >= last_tick,
                "tick moved backwards on scheduler '{}' (from {last_tick} to {tick})",
                core.name
            );
            assert!(
                elapsed >= core.last_elapsed.get(),
                "elapsed time moved backwards on scheduler '{}' (from {:?} to {elapsed:?})",
                core.name,
                core.last_elapsed.get()
            );

            if tick == last_tick {
                tracing::event!(
                    name: "cadence.scheduler.duplicate_tick",
                    tracing::Level::DEBUG,
                    scheduler.name = %core.name,
                    tick = tick,
                );

                return Sweep::skipped(tick);
            }
        }

        let now = ClockReading::new(tick, elapsed);
        let pass = Pass::enter(core, now);

        let eligible: Vec<Rc<Entry>> = core
            .fibers
            .borrow()
            .iter()
            .filter(|entry| entry.is_eligible(now))
            .cloned()
            .collect();

        let mut resumed = 0;
        for entry in eligible {
            // Cancelled earlier in this pass.
            if entry.is_terminal() {
                continue;
            }

            if self.drive(&entry, Some(now), Some(now)) {
                resumed += 1;
            }
        }

        let reaped = self.reap();

        drop(pass);
        core.last_tick.set(Some(tick));
        core.last_elapsed.set(elapsed);

        tracing::event!(
            name: "cadence.scheduler.pass",
            tracing::Level::DEBUG,
            scheduler.name = %core.name,
            tick = tick,
            fibers.resumed = resumed,
            fibers.reaped = reaped,
            fibers.live = self.len(),
        );

        Sweep {
            tick,
            resumed,
            reaped,
            skipped: false,
        }
    }

    /// Runs one pass at the clock's current reading.
    ///
    /// # Panics
    ///
    /// See [`advance`][Self::advance].
    pub fn update<C>(&self, clock: &C) -> Sweep
    where
        C: Clock + ?Sized,
    {
        let now = clock.reading();
        self.advance(now.tick(), now.elapsed())
    }

    /// Cancels every tracked fiber, drops their computations and refuses new fibers.
    ///
    /// Later calls to [`advance`][Self::advance] do nothing and calls to [`run`][Self::run]
    /// panic. Calling `shutdown` again has no effect.
    ///
    /// # Panics
    ///
    /// Panics if called from inside one of this scheduler's fibers during a pass. Also panics if
    /// the cleanup of a cancelled computation submits a fiber to this scheduler, since the
    /// scheduler no longer accepts fibers by then; such cleanup must submit elsewhere.
    pub fn shutdown(&self) {
        let core = &*self.core;

        assert!(
            core.in_flight.get().is_none(),
            "cannot shut down scheduler '{}' from inside one of its own fibers",
            core.name
        );

        if core.shut_down.replace(true) {
            return;
        }

        let entries = core.fibers.take();
        let cancelled = entries.iter().filter(|entry| entry.observer.cancel()).count();

        for entry in &entries {
            entry.release();
        }

        tracing::event!(
            name: "cadence.scheduler.shutdown",
            tracing::Level::DEBUG,
            scheduler.name = %core.name,
            fibers.cancelled = cancelled,
        );
    }

    /// Resumes a fiber once. Returns `false` if the fiber was not resumable.
    ///
    /// A wait the fiber yields is measured from `since`, or from the next pass when `None`.
    fn drive(&self, entry: &Entry, now: Option<ClockReading>, since: Option<ClockReading>) -> bool {
        // The computation is taken out so that the fiber can reach the scheduler while it runs.
        let Some(mut task) = entry.task.borrow_mut().take() else {
            return false;
        };

        let mut cx = Context::new(self, entry.id, now);
        let resumed = panic::catch_unwind(AssertUnwindSafe(|| task.resume(&mut cx)));

        match resumed {
            Ok(Resumed::Yielded(command)) => {
                *entry.wait.borrow_mut() = Some(PendingWait::new(command, since));
                *entry.task.borrow_mut() = Some(task);
            }
            Ok(Resumed::Finished) => drop(task),
            Err(payload) => {
                entry.observer.fail(FiberError::panicked(&*payload));
                drop(task);

                if self.core.panic_policy == PanicPolicy::Propagate {
                    panic::resume_unwind(payload);
                }
            }
        }

        true
    }

    fn reap(&self) -> usize {
        let reaped: Vec<Rc<Entry>> = {
            let mut fibers = self.core.fibers.borrow_mut();
            let (reaped, live) = fibers.drain(..).partition(|entry| entry.is_terminal());
            *fibers = live;
            reaped
        };

        for entry in &reaped {
            entry.release();

            tracing::event!(
                name: "cadence.fiber.reaped",
                tracing::Level::TRACE,
                scheduler.name = %self.core.name,
                fiber.id = entry.id.as_u64(),
                fiber.state = entry.observer.state().as_str(),
            );
        }

        reaped.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.core.name)
            .field("fibers", &self.len())
            .field("last_tick", &self.core.last_tick.get())
            .field("shut_down", &self.core.shut_down.get())
            .finish()
    }
}

impl Core {
    fn last_reading(&self) -> Option<ClockReading> {
        self.last_tick.get().map(|tick| ClockReading::new(tick, self.last_elapsed.get()))
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        let entries = std::mem::take(self.fibers.get_mut());

        for entry in &entries {
            entry.observer.cancel();
        }

        for entry in &entries {
            entry.release();
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Scheduler: Clone, Default, fmt::Debug);
        static_assertions::assert_impl_all!(Sweep: Copy, fmt::Debug);
        static_assertions::assert_not_impl_any!(Scheduler: Send, Sync);
    }

    #[test]
    fn empty_pass() {
        let scheduler = Scheduler::new();

        let sweep = scheduler.advance(1, Duration::ZERO);

        assert_eq!(sweep.tick(), 1);
        assert_eq!(sweep.resumed(), 0);
        assert_eq!(sweep.reaped(), 0);
        assert!(!sweep.is_skipped());
        assert_eq!(scheduler.last_tick(), Some(1));
    }

    #[test]
    fn fiber_finishing_in_run_is_not_tracked() {
        let scheduler = Scheduler::new();

        let handle = scheduler.run(fiber::from_fn(|_cx| Step::Complete(())));

        assert!(handle.is_finished());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn sweep_counts_resumed_and_reaped() {
        let scheduler = Scheduler::new();
        let _a = scheduler.run(fiber::from_fn(|_cx| Step::<()>::next_tick()));
        let mut first = true;
        let _b = scheduler.run(fiber::from_fn(move |_cx| {
            if first {
                first = false;
                Step::next_tick()
            } else {
                Step::Complete(())
            }
        }));

        scheduler.advance(1, Duration::ZERO);
        let sweep = scheduler.advance(2, ms(16));

        assert_eq!(sweep.resumed(), 2);
        assert_eq!(sweep.reaped(), 1);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn duplicate_tick_is_skipped() {
        let scheduler = Scheduler::new();
        let _handle = scheduler.run(fiber::from_fn(|_cx| Step::<()>::next_tick()));

        scheduler.advance(1, Duration::ZERO);
        scheduler.advance(2, ms(16));
        let sweep = scheduler.advance(2, ms(16));

        assert!(sweep.is_skipped());
        assert_eq!(sweep.resumed(), 0);
    }

    #[test]
    #[should_panic(expected = "tick moved backwards")]
    fn decreasing_tick_panics() {
        let scheduler = Scheduler::new();

        scheduler.advance(5, Duration::ZERO);
        scheduler.advance(4, Duration::ZERO);
    }

    #[test]
    #[should_panic(expected = "elapsed time moved backwards")]
    fn decreasing_elapsed_panics() {
        let scheduler = Scheduler::new();

        scheduler.advance(1, ms(100));
        scheduler.advance(2, ms(50));
    }

    #[test]
    fn reentrant_advance_fails_the_fiber() {
        let scheduler = Scheduler::new();
        let _handle = scheduler.run(fiber::from_fn(|_cx| Step::<()>::next_tick()));
        let handle = scheduler.run(fiber::from_fn(|cx| {
            if cx.now().is_some() {
                cx.scheduler().advance(99, Duration::ZERO);
            }
            Step::<()>::next_tick()
        }));

        scheduler.advance(1, Duration::ZERO);
        scheduler.advance(2, ms(16));

        let error = handle.outcome().and_then(|outcome| outcome.error().cloned()).expect("fiber failed");
        assert!(error.is_panic());
        assert!(error.to_string().contains("from inside one of its own fibers"));
        assert_eq!(scheduler.last_tick(), Some(2));
    }

    #[test]
    fn shutdown_cancels_and_releases() {
        let scheduler = Scheduler::new();
        let handle = scheduler.run(fiber::from_fn(|_cx| Step::<()>::sleep(ms(1_000))));

        scheduler.shutdown();
        scheduler.shutdown();

        assert!(scheduler.is_shut_down());
        assert!(scheduler.is_empty());
        assert_eq!(handle.state(), FiberState::Cancelled);
        assert!(scheduler.advance(1, Duration::ZERO).is_skipped());
    }

    #[test]
    #[should_panic(expected = "after it was shut down")]
    fn run_after_shutdown_panics() {
        let scheduler = Scheduler::new();
        scheduler.shutdown();

        let _handle = scheduler.run(fiber::from_fn(|_cx| Step::Complete(())));
    }

    #[test]
    #[should_panic(expected = "after it was shut down")]
    fn cleanup_submitting_during_shutdown_panics() {
        struct Leave(Scheduler);

        impl Drop for Leave {
            fn drop(&mut self) {
                let _leave = self.0.run(fiber::from_fn(|_cx| Step::Complete(())));
            }
        }

        let scheduler = Scheduler::new();
        let leave = Leave(scheduler.clone());
        let _handle = scheduler.run(fiber::from_fn(move |_cx| {
            let _leave = &leave;
            Step::<()>::next_tick()
        }));

        scheduler.shutdown();
    }

    #[test]
    fn wait_issued_between_passes_is_measured_from_last_pass() {
        let scheduler = Scheduler::new();
        scheduler.advance(1, Duration::ZERO);
        scheduler.advance(2, ms(16));

        let handle = scheduler.run(fiber::from_fn(|cx| match cx.now() {
            None => Step::next_tick(),
            Some(now) => Step::Complete(now.tick()),
        }));

        let sweep = scheduler.advance(3, ms(32));

        assert_eq!(sweep.resumed(), 1);
        assert_eq!(handle.outcome().and_then(Outcome::ok), Some(3));
    }

    #[test]
    fn dropping_scheduler_cancels_fibers() {
        let scheduler = Scheduler::new();
        let handle = scheduler.run(fiber::from_fn(|_cx| Step::<()>::next_tick()));

        drop(scheduler);

        assert_eq!(handle.state(), FiberState::Cancelled);
    }

    #[test]
    fn debug_ok() {
        let scheduler = Scheduler::builder().with_name("frames").build();

        let text = format!("{scheduler:?}");

        assert!(text.contains("frames"));
        assert!(text.contains("last_tick: None"));
    }
}
