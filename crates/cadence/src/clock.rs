// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::rc::Rc;
use std::time::Duration;

/// A logical time source that drives a [`Scheduler`][crate::Scheduler].
///
/// A clock supplies two values:
///
/// - A tick counter that never decreases. The host advances it once per logical update, for
///   example once per presented frame or once per fixed simulation step.
/// - The elapsed time since the clock started. Duration-based waits are evaluated against this
///   value, never against the tick count, so they stay correct when tick length varies.
///
/// Reading a clock has no side effects. The host owns the clock and is the only party that
/// advances it; schedulers only read it.
///
/// Several independent clocks may exist at the same time, each driving its own scheduler. The
/// crate provides [`ManualClock`][crate::ManualClock], [`FrameClock`][crate::FrameClock] and
/// [`FixedStepClock`][crate::FixedStepClock].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// clock.advance(Duration::from_millis(16));
///
/// assert_eq!(clock.tick(), 1);
/// assert_eq!(clock.elapsed(), Duration::from_millis(16));
/// ```
pub trait Clock {
    /// Returns the current tick.
    fn tick(&self) -> u64;

    /// Returns the time elapsed since the clock started.
    fn elapsed(&self) -> Duration;

    /// Returns the tick and the elapsed time together.
    fn reading(&self) -> ClockReading {
        ClockReading::new(self.tick(), self.elapsed())
    }
}

impl<C> Clock for &C
where
    C: Clock + ?Sized,
{
    fn tick(&self) -> u64 {
        (**self).tick()
    }

    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }
}

impl<C> Clock for Rc<C>
where
    C: Clock + ?Sized,
{
    fn tick(&self) -> u64 {
        (**self).tick()
    }

    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }
}

/// A snapshot of a clock: the tick and the elapsed time observed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockReading {
    tick: u64,
    elapsed: Duration,
}

impl ClockReading {
    /// Creates a reading from a tick and an elapsed time.
    #[must_use]
    pub const fn new(tick: u64, elapsed: Duration) -> Self {
        Self { tick, elapsed }
    }

    /// The tick of this reading.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// The elapsed time of this reading.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u64, Duration);

    impl Clock for Fixed {
        fn tick(&self) -> u64 {
            self.0
        }

        fn elapsed(&self) -> Duration {
            self.1
        }
    }

    #[test]
    fn reading_combines_tick_and_elapsed() {
        let clock = Fixed(3, Duration::from_millis(50));

        assert_eq!(clock.reading(), ClockReading::new(3, Duration::from_millis(50)));
    }

    #[test]
    fn reference_and_rc_delegate() {
        let clock = Fixed(9, Duration::from_secs(2));
        let by_ref = &clock;
        let shared: Rc<dyn Clock> = Rc::new(Fixed(4, Duration::from_secs(1)));

        assert_eq!(by_ref.tick(), 9);
        assert_eq!(by_ref.elapsed(), Duration::from_secs(2));
        assert_eq!(shared.reading(), ClockReading::new(4, Duration::from_secs(1)));
    }

    #[test]
    fn readings_order_by_tick_first() {
        let earlier = ClockReading::new(1, Duration::from_secs(5));
        let later = ClockReading::new(2, Duration::ZERO);

        assert!(earlier < later);
    }
}
