// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::{AnyHandle, ClockReading, Handle};

/// Describes why a fiber is suspended and when it becomes eligible to resume.
///
/// A fiber yields exactly one wait command every time it suspends. The scheduler evaluates the
/// command against its clock on every [`advance`][crate::Scheduler::advance] pass:
///
/// - [`NextTick`][Self::NextTick] resumes on the next distinct tick the scheduler observes.
/// - [`ForDuration`][Self::ForDuration] resumes once the elapsed time has advanced by at least
///   the given duration since the wait was issued. It is measured in time, not in ticks, so it
///   stays accurate when ticks have variable length.
/// - [`UntilHandleCompletes`][Self::UntilHandleCompletes] resumes once the referenced fiber has
///   reached a terminal state, on this or any other scheduler.
///
/// A wait never resumes in the pass that issued it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{Scheduler, Step, WaitCommand, fiber};
///
/// let scheduler = Scheduler::new();
/// let mut waited = false;
///
/// let handle = scheduler.run(fiber::from_fn(move |_cx| {
///     if waited {
///         return Step::Complete("deployed");
///     }
///
///     waited = true;
///     Step::Yield(WaitCommand::ForDuration(Duration::from_secs(1)))
/// }));
///
/// scheduler.advance(1, Duration::ZERO);
/// scheduler.advance(2, Duration::from_millis(500));
/// assert!(!handle.is_finished());
///
/// scheduler.advance(3, Duration::from_secs(1));
/// assert_eq!(handle.outcome().and_then(|outcome| outcome.ok()), Some("deployed"));
/// ```
#[derive(Debug, Clone)]
pub enum WaitCommand {
    /// Resume on the next distinct tick.
    NextTick,

    /// Resume once at least this much elapsed time has passed.
    ForDuration(Duration),

    /// Resume once the fiber behind the handle has terminated.
    UntilHandleCompletes(AnyHandle),
}

impl WaitCommand {
    /// Creates a [`ForDuration`][Self::ForDuration] wait from a number of seconds.
    ///
    /// Negative and NaN values wait for nothing; values too large to represent wait forever.
    #[must_use]
    pub fn seconds(seconds: f64) -> Self {
        let duration = if seconds.is_nan() || seconds <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        };

        Self::ForDuration(duration)
    }
}

impl From<Duration> for WaitCommand {
    fn from(duration: Duration) -> Self {
        Self::ForDuration(duration)
    }
}

impl From<AnyHandle> for WaitCommand {
    fn from(handle: AnyHandle) -> Self {
        Self::UntilHandleCompletes(handle)
    }
}

impl<T: 'static> From<&Handle<T>> for WaitCommand {
    fn from(handle: &Handle<T>) -> Self {
        Self::UntilHandleCompletes(handle.erase())
    }
}

/// The wait a suspended fiber is currently holding, together with the reading it was issued at.
#[derive(Debug)]
pub(crate) struct PendingWait {
    command: WaitCommand,
    since: Option<ClockReading>,
}

impl PendingWait {
    /// A wait issued before its scheduler ran any pass has no reading yet; it is stamped by the
    /// first pass that evaluates it.
    pub(crate) const fn new(command: WaitCommand, since: Option<ClockReading>) -> Self {
        Self { command, since }
    }

    pub(crate) fn is_ready(&mut self, now: ClockReading) -> bool {
        let since = *self.since.get_or_insert(now);

        if now.tick() <= since.tick() {
            return false;
        }

        match &self.command {
            WaitCommand::NextTick => true,
            WaitCommand::ForDuration(duration) => now.elapsed().saturating_sub(since.elapsed()) >= *duration,
            WaitCommand::UntilHandleCompletes(handle) => handle.is_finished(),
        }
    }
}
