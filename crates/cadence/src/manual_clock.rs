// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::{Clock, ClockReading};

/// A clock whose passage of time is controlled explicitly.
///
/// Useful in tests and in hosts that already compute their own tick and frame time. Cloning is
/// inexpensive and every clone shares the same state: advancing one clone is visible through
/// all of them.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{Clock, ManualClock, Scheduler};
///
/// let clock = ManualClock::new();
/// let scheduler = Scheduler::new();
///
/// let handle = scheduler.run_async(|s| async move {
///     s.sleep(Duration::from_millis(100)).await;
///     Ok(())
/// });
///
/// for _ in 0..10 {
///     clock.advance(Duration::from_millis(16));
///     scheduler.update(&clock);
/// }
///
/// assert!(handle.is_finished());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Rc<Cell<ClockReading>>,
}

impl ManualClock {
    /// Creates a clock at tick 0 with no elapsed time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock positioned at the given reading.
    #[must_use]
    pub fn new_at(reading: ClockReading) -> Self {
        Self {
            state: Rc::new(Cell::new(reading)),
        }
    }

    /// Moves the clock forward by one tick that lasted `delta`.
    ///
    /// Returns the new reading.
    pub fn advance(&self, delta: Duration) -> ClockReading {
        self.advance_ticks(1, delta)
    }

    /// Moves the clock forward by `ticks` ticks, each lasting `delta_per_tick`.
    ///
    /// Returns the new reading. Elapsed time saturates at [`Duration::MAX`].
    pub fn advance_ticks(&self, ticks: u64, delta_per_tick: Duration) -> ClockReading {
        let current = self.state.get();
        let delta = u32::try_from(ticks)
            .ok()
            .and_then(|ticks| delta_per_tick.checked_mul(ticks))
            .unwrap_or(Duration::MAX);

        let next = ClockReading::new(
            current.tick().saturating_add(ticks),
            current.elapsed().saturating_add(delta),
        );

        self.state.set(next);
        next
    }

    /// Positions the clock at the given reading.
    ///
    /// # Panics
    ///
    /// Panics if either the tick or the elapsed time would move backwards. Clocks are monotonic.
    pub fn set(&self, reading: ClockReading) {
        let current = self.state.get();

        assert!(
            reading.tick() >= current.tick() && reading.elapsed() >= current.elapsed(),
            "a clock cannot move backwards (from {current:?} to {reading:?})"
        );

        self.state.set(reading);
    }
}

impl Clock for ManualClock {
    fn tick(&self) -> u64 {
        self.state.get().tick()
    }

    fn elapsed(&self) -> Duration {
        self.state.get().elapsed()
    }

    fn reading(&self) -> ClockReading {
        self.state.get()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(ManualClock: Clone, Default, std::fmt::Debug);
        static_assertions::assert_not_impl_any!(ManualClock: Send, Sync);
    }

    #[test]
    fn starts_at_zero() {
        let clock = ManualClock::new();

        assert_eq!(clock.reading(), ClockReading::default());
    }

    #[test]
    fn advance_moves_tick_and_elapsed() {
        let clock = ManualClock::new();

        let reading = clock.advance(Duration::from_millis(20));

        assert_eq!(reading, ClockReading::new(1, Duration::from_millis(20)));
        assert_eq!(clock.reading(), reading);
    }

    #[test]
    fn advance_ticks_multiplies_delta() {
        let clock = ManualClock::new_at(ClockReading::new(10, Duration::from_secs(1)));

        let reading = clock.advance_ticks(5, Duration::from_millis(100));

        assert_eq!(reading, ClockReading::new(15, Duration::from_millis(1500)));
    }

    #[test]
    fn advance_ticks_saturates() {
        let clock = ManualClock::new_at(ClockReading::new(u64::MAX - 1, Duration::MAX));

        let reading = clock.advance_ticks(5, Duration::from_secs(1));

        assert_eq!(reading, ClockReading::new(u64::MAX, Duration::MAX));
    }

    #[test]
    fn clones_share_state() {
        let clock = ManualClock::new();
        let clone = clock.clone();

        clock.advance(Duration::from_secs(1));

        assert_eq!(clone.tick(), 1);
        assert_eq!(clone.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn set_forward_ok() {
        let clock = ManualClock::new();

        clock.set(ClockReading::new(4, Duration::from_secs(4)));

        assert_eq!(clock.tick(), 4);
    }

    #[test]
    #[should_panic(expected = "a clock cannot move backwards")]
    fn set_backwards_panics() {
        let clock = ManualClock::new_at(ClockReading::new(4, Duration::from_secs(4)));

        clock.set(ClockReading::new(3, Duration::from_secs(5)));
    }
}
