// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::unwrap_used,
        reason = "allow these lints in tests to improve the readability of the tests"
    )
)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A clock-driven, single-threaded cooperative fiber scheduler for frame loops.
//!
//! Long-lived workflows such as a multiplayer handshake, a registration with retries or a timed
//! gameplay sequence are written as sequential code that suspends at well-defined points. A
//! [`Scheduler`] resumes them from the host's update loop, at a rate set by a logical
//! [`Clock`], and lets the host or other fibers cancel them at any time.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use cadence::{Clock, FixedStepClock, Outcome, Scheduler};
//!
//! let mut clock = FixedStepClock::new(Duration::from_millis(20));
//! let scheduler = Scheduler::builder().with_name("simulation").build();
//!
//! let parachute = scheduler.run_async(|s| async move {
//!     // Free fall for a second, then deploy.
//!     s.sleep(Duration::from_secs(1)).await;
//!     Ok("deployed")
//! });
//!
//! // The host loop: feed real frame time, run one pass per fixed step.
//! for _frame in 0..100 {
//!     clock.accumulate(Duration::from_millis(16));
//!     while clock.step() {
//!         scheduler.update(&clock);
//!     }
//! }
//!
//! assert!(matches!(parachute.outcome(), Some(Outcome::Completed("deployed"))));
//! ```
//!
//! # Overview
//!
//! - A [`Clock`] supplies a non-decreasing tick and the elapsed time. [`ManualClock`],
//!   [`FrameClock`] and [`FixedStepClock`] cover tests, presentation frames and fixed simulation
//!   steps. Each scheduler is driven by one clock; several can run side by side.
//! - A [`Fiber`] is a resumable computation. Every resumption ends by yielding a
//!   [`WaitCommand`] or by terminating. Fibers are written as state machines with
//!   [`fiber::from_fn`] or as `async` bodies with [`fiber::from_async`].
//! - [`Scheduler::run`] returns a [`Handle`] that observes the fiber and can cancel it. Another
//!   fiber can wait for the handle, on the same scheduler or on a different one, and receives
//!   the fiber's [`Outcome`] as a value.
//! - The [`compose`] module builds timeouts, retries and periodic work from these primitives.
//!
//! # Ordering
//!
//! Fibers resume in submission order within a pass. A fiber is driven to its first suspension
//! point when it is submitted and is not resumed again in the same pass. A wait never becomes
//! ready in the pass that issued it, and a fiber waiting on another fiber resumes in a pass
//! strictly after the one in which the awaited fiber terminated.
//!
//! # Cancellation
//!
//! [`Handle::cancel`] marks a fiber [`Cancelled`][FiberState::Cancelled] immediately. The fiber
//! is never resumed again; its computation is dropped, running any cleanup it performs in `Drop`,
//! at the end of the next pass of its scheduler. Cancelling a fiber does not cancel the fibers it
//! started. For fibers that only need to stop looping alongside a host object, a [`StopFlag`]
//! is simpler.
//!
//! # Failures
//!
//! A fiber fails by returning an error or by panicking. Either way the error is stored on its
//! handle and the host loop keeps running, unless [`PanicPolicy::Propagate`] asks for panics to
//! unwind into the host.
//!
//! # Threading
//!
//! Everything in this crate is single-threaded: schedulers, handles and fibers are neither `Send`
//! nor `Sync`.

mod builder;
mod clock;
pub mod compose;
mod error;
pub mod fiber;
mod fixed_step_clock;
mod frame_clock;
mod handle;
mod id;
mod manual_clock;
mod scheduler;
mod stop_flag;
mod wait;

pub use builder::{PanicPolicy, SchedulerBuilder};
pub use clock::{Clock, ClockReading};
pub use error::{FiberError, Result};
pub use fiber::{Context, Fiber, FiberExt, Step, Suspender};
pub use fixed_step_clock::FixedStepClock;
pub use frame_clock::FrameClock;
pub use handle::{AnyHandle, FiberState, Handle, Outcome};
pub use id::FiberId;
pub use manual_clock::ManualClock;
pub use scheduler::{Scheduler, Sweep};
pub use stop_flag::StopFlag;
pub use wait::WaitCommand;
