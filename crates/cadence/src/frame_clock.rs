// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use crate::{Clock, ClockReading};

/// The longest time a single frame may contribute to the elapsed time, unless configured otherwise.
///
/// A debugger pause or a suspended process would otherwise release every pending timed wait in
/// one frame.
const DEFAULT_MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// A free-running presentation clock: one tick per presented frame.
///
/// Each call to [`begin_frame`][Self::begin_frame] starts a new frame, advancing the tick by one
/// and the elapsed time by the real time that passed since the previous frame. Frames therefore
/// have variable length, which is why timed waits are measured in elapsed time rather than ticks.
///
/// The first frame starts at tick 1 with no elapsed time.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
///
/// use cadence::{Clock, FrameClock};
///
/// let start = Instant::now();
/// let mut clock = FrameClock::new();
///
/// clock.begin_frame_at(start);
/// clock.begin_frame_at(start + Duration::from_millis(16));
/// clock.begin_frame_at(start + Duration::from_millis(35));
///
/// assert_eq!(clock.tick(), 3);
/// assert_eq!(clock.elapsed(), Duration::from_millis(35));
/// assert_eq!(clock.delta(), Duration::from_millis(19));
/// ```
#[derive(Debug, Clone)]
pub struct FrameClock {
    tick: u64,
    elapsed: Duration,
    delta: Duration,
    last_frame: Option<Instant>,
    max_frame_delta: Duration,
}

impl FrameClock {
    /// Creates a clock that has not presented any frame yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick: 0,
            elapsed: Duration::ZERO,
            delta: Duration::ZERO,
            last_frame: None,
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
        }
    }

    /// Limits how much time a single frame may contribute to the elapsed time.
    ///
    /// Defaults to 250 milliseconds.
    #[must_use]
    pub const fn with_max_frame_delta(mut self, max_frame_delta: Duration) -> Self {
        self.max_frame_delta = max_frame_delta;
        self
    }

    /// Starts a new frame now.
    pub fn begin_frame(&mut self) -> ClockReading {
        self.begin_frame_at(Instant::now())
    }

    /// Starts a new frame at the given instant.
    ///
    /// Instants earlier than the previous frame count as zero-length frames.
    pub fn begin_frame_at(&mut self, now: Instant) -> ClockReading {
        let delta = match self.last_frame {
            Some(previous) => now.saturating_duration_since(previous).min(self.max_frame_delta),
            None => Duration::ZERO,
        };

        if self.last_frame.is_some_and(|previous| now.saturating_duration_since(previous) > delta) {
            tracing::event!(
                name: "cadence.frame_clock.clamped",
                tracing::Level::DEBUG,
                clock.tick = self.tick.saturating_add(1),
                clock.max_frame_delta = self.max_frame_delta.as_secs_f32(),
            );
        }

        self.last_frame = Some(self.last_frame.map_or(now, |previous| previous.max(now)));
        self.tick = self.tick.saturating_add(1);
        self.elapsed = self.elapsed.saturating_add(delta);
        self.delta = delta;

        self.reading()
    }

    /// The length of the most recent frame.
    #[must_use]
    pub const fn delta(&self) -> Duration {
        self.delta
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FrameClock {
    fn tick(&self) -> u64 {
        self.tick
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
