// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::Cell;
use std::rc::Rc;

/// A shared "stop looping" signal.
///
/// A lighter alternative to [`Handle::cancel`][crate::Handle::cancel] for fibers that live
/// alongside a host object: the host sets the flag when the object goes away, and every fiber
/// wrapped with [`FiberExt::stop_on`][crate::FiberExt::stop_on] completes instead of resuming
/// again. Async fiber bodies may also poll [`is_stopped`][Self::is_stopped] directly.
///
/// Clones share the same flag. Once stopped, a flag stays stopped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence::{FiberExt, Scheduler, StopFlag, Step, fiber};
///
/// let scheduler = Scheduler::new();
/// let stop = StopFlag::new();
///
/// let pinger = scheduler.run(fiber::from_fn(|_cx| Step::<()>::next_tick()).stop_on(stop.clone()));
///
/// scheduler.advance(1, Duration::ZERO);
/// scheduler.advance(2, Duration::from_millis(16));
/// assert!(!pinger.is_finished());
///
/// stop.stop();
/// scheduler.advance(3, Duration::from_millis(32));
/// assert!(matches!(pinger.outcome(), Some(cadence::Outcome::Completed(None))));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Rc<Cell<bool>>);

impl StopFlag {
    /// Creates a flag that is not stopped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag.
    pub fn stop(&self) {
        self.0.set(true);
    }

    /// Returns `true` once [`stop`][Self::stop] has been called on any clone.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.get()
    }
}
