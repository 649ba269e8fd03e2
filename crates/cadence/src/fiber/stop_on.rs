// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{Context, Fiber, Step};
use crate::StopFlag;

/// Extension methods for [`Fiber`].
pub trait FiberExt: Fiber {
    /// Stops the fiber once `flag` is set.
    ///
    /// Before every resumption the wrapper checks the flag. Once it is set, the fiber is dropped
    /// without being resumed and the wrapper completes with `None`. A fiber that finishes on its
    /// own completes with `Some(output)`.
    fn stop_on(self, flag: StopFlag) -> StopOn<Self>
    where
        Self: Sized,
    {
        StopOn {
            fiber: Some(self),
            flag,
        }
    }

    /// Boxes the fiber, erasing its concrete type.
    fn boxed<'a>(self) -> Box<dyn Fiber<Output = Self::Output> + 'a>
    where
        Self: Sized + 'a,
    {
        Box::new(self)
    }
}

impl<F: Fiber> FiberExt for F {}

/// A fiber wrapped by [`FiberExt::stop_on`].
#[derive(Debug)]
pub struct StopOn<F> {
    fiber: Option<F>,
    flag: StopFlag,
}

impl<F: Fiber> Fiber for StopOn<F> {
    type Output = Option<F::Output>;

    fn resume(&mut self, cx: &mut Context<'_>) -> Step<Self::Output> {
        if self.flag.is_stopped() {
            self.fiber = None;
            return Step::Complete(None);
        }

        match self.fiber.as_mut() {
            Some(fiber) => fiber.resume(cx).map(Some),
            None => Step::Complete(None),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::fiber::from_fn;
    use crate::{Outcome, Scheduler};

    struct Drops(Rc<Cell<bool>>);

    impl Drop for Drops {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn stopped_before_submission_never_resumes() {
        let scheduler = Scheduler::new();
        let flag = StopFlag::new();
        let resumed = Rc::new(Cell::new(false));
        let seen = Rc::clone(&resumed);

        flag.stop();
        let handle = scheduler.run(
            from_fn(move |_cx| {
                seen.set(true);
                Step::<()>::next_tick()
            })
            .stop_on(flag),
        );

        assert!(!resumed.get());
        assert!(matches!(handle.outcome(), Some(Outcome::Completed(None))));
    }

    #[test]
    fn natural_completion_is_some() {
        let scheduler = Scheduler::new();

        let handle = scheduler.run(from_fn(|_cx| Step::Complete(9)).stop_on(StopFlag::new()));

        assert!(matches!(handle.outcome(), Some(Outcome::Completed(Some(9)))));
    }

    #[test]
    fn stopping_drops_the_inner_fiber() {
        let scheduler = Scheduler::new();
        let flag = StopFlag::new();
        let dropped = Rc::new(Cell::new(false));
        let guard = Drops(Rc::clone(&dropped));

        let handle = scheduler.run(
            from_fn(move |_cx| {
                let _keep = &guard;
                Step::<()>::next_tick()
            })
            .stop_on(flag.clone()),
        );

        scheduler.advance(1, Duration::ZERO);
        assert!(!dropped.get());

        flag.stop();
        scheduler.advance(2, Duration::from_millis(16));

        assert!(dropped.get());
        assert!(handle.is_finished());
    }

    #[test]
    fn boxed_keeps_output() {
        let scheduler = Scheduler::new();

        let handle = scheduler.run(from_fn(|_cx| Step::Complete("done")).boxed());

        assert_eq!(handle.outcome().and_then(Outcome::ok), Some("done"));
    }
}
