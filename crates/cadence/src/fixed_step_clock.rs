// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::{Clock, ClockReading};

/// How many fixed steps a single frame may release, unless configured otherwise.
const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 8;

/// A fixed-step simulation clock.
///
/// Real frame time is fed into the clock with [`accumulate`][Self::accumulate] and released as
/// whole steps of equal length. Every [`step`][Self::step] advances the tick by one and the
/// elapsed time by exactly one step duration, so a scheduler driven by this clock observes a
/// perfectly regular timeline regardless of how irregular the frames were.
///
/// The number of steps a single frame can release is capped. When the host falls behind by more
/// than the cap, the backlog beyond the cap is discarded instead of being simulated in a burst.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{Clock, FixedStepClock, Scheduler};
///
/// let mut clock = FixedStepClock::new(Duration::from_millis(20));
/// let scheduler = Scheduler::new();
///
/// // A 50ms frame releases two 20ms steps and keeps 10ms for the next frame.
/// assert_eq!(clock.accumulate(Duration::from_millis(50)), 2);
///
/// while clock.step() {
///     scheduler.update(&clock);
/// }
///
/// assert_eq!(clock.tick(), 2);
/// assert_eq!(clock.elapsed(), Duration::from_millis(40));
/// assert!((clock.alpha() - 0.5).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    step: Duration,
    max_steps_per_frame: u32,
    accumulator: Duration,
    pending: u32,
    tick: u64,
    elapsed: Duration,
}

impl FixedStepClock {
    /// Creates a clock that advances in steps of the given duration.
    ///
    /// # Panics
    ///
    /// Panics if `step` is zero.
    #[must_use]
    pub fn new(step: Duration) -> Self {
        assert!(!step.is_zero(), "the fixed step duration must be greater than zero");

        Self {
            step,
            max_steps_per_frame: DEFAULT_MAX_STEPS_PER_FRAME,
            accumulator: Duration::ZERO,
            pending: 0,
            tick: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Limits how many steps a single call to [`accumulate`][Self::accumulate] can leave pending.
    ///
    /// Defaults to 8.
    ///
    /// # Panics
    ///
    /// Panics if `max_steps_per_frame` is zero.
    #[must_use]
    pub fn with_max_steps_per_frame(mut self, max_steps_per_frame: u32) -> Self {
        assert!(max_steps_per_frame > 0, "at least one step per frame must be allowed");

        self.max_steps_per_frame = max_steps_per_frame;
        self
    }

    /// Adds the real time of a frame and returns the number of steps now pending.
    #[cfg_attr(test, mutants::skip)] // Mutating the release loop causes test timeouts.
    pub fn accumulate(&mut self, frame_delta: Duration) -> u32 {
        self.accumulator = self.accumulator.saturating_add(frame_delta);

        while self.pending < self.max_steps_per_frame && self.accumulator >= self.step {
            self.accumulator -= self.step;
            self.pending += 1;
        }

        if self.accumulator >= self.step {
            let remainder = self.accumulator.as_nanos() % self.step.as_nanos();
            let discarded = self.accumulator.as_secs_f32();

            self.accumulator = Duration::from_nanos(u64::try_from(remainder).unwrap_or(u64::MAX));

            tracing::event!(
                name: "cadence.fixed_step_clock.backlog_discarded",
                tracing::Level::DEBUG,
                clock.tick = self.tick,
                clock.discarded = discarded,
                clock.max_steps_per_frame = self.max_steps_per_frame,
            );
        }

        self.pending
    }

    /// Consumes one pending step, advancing the clock.
    ///
    /// Returns `false` when no step is pending.
    pub fn step(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }

        self.pending -= 1;
        self.tick = self.tick.saturating_add(1);
        self.elapsed = self.elapsed.saturating_add(self.step);
        true
    }

    /// The number of steps released but not yet consumed.
    #[must_use]
    pub const fn pending_steps(&self) -> u32 {
        self.pending
    }

    /// The duration of one step.
    #[must_use]
    pub const fn step_duration(&self) -> Duration {
        self.step
    }

    /// The fraction of a step accumulated but not yet released, in the range `[0, 1)`.
    ///
    /// Presentation code uses it to interpolate between the last two simulated states.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.accumulator.as_secs_f64() / self.step.as_secs_f64()
    }
}

impl Clock for FixedStepClock {
    fn tick(&self) -> u64 {
        self.tick
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn reading(&self) -> ClockReading {
        ClockReading::new(self.tick, self.elapsed)
    }
}
