// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

use crate::Scheduler;

/// What a scheduler does when a fiber panics while being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum PanicPolicy {
    /// The panic is caught at the fiber boundary and the fiber fails with an error for which
    /// [`FiberError::is_panic`][crate::FiberError::is_panic] returns `true`. The host loop keeps
    /// running.
    #[default]
    Contain,

    /// The fiber is marked failed and released, then the panic continues unwinding into the
    /// caller of [`Scheduler::advance`] or [`Scheduler::run`].
    Propagate,
}

/// Configures and creates a [`Scheduler`].
///
/// # Examples
///
/// ```
/// use cadence::{PanicPolicy, Scheduler};
///
/// let scheduler = Scheduler::builder()
///     .with_name("simulation")
///     .with_panic_policy(PanicPolicy::Propagate)
///     .with_capacity(64)
///     .build();
///
/// assert_eq!(scheduler.name(), "simulation");
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerBuilder {
    pub(crate) name: Cow<'static, str>,
    pub(crate) panic_policy: PanicPolicy,
    pub(crate) capacity: usize,
}

impl SchedulerBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            name: Cow::Borrowed("default"),
            panic_policy: PanicPolicy::Contain,
            capacity: 0,
        }
    }

    /// Sets the name reported in log events. Defaults to `"default"`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets what happens when a fiber panics. Defaults to [`PanicPolicy::Contain`].
    #[must_use]
    pub const fn with_panic_policy(mut self, panic_policy: PanicPolicy) -> Self {
        self.panic_policy = panic_policy;
        self
    }

    /// Reserves room for the given number of fibers up front.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Creates the scheduler.
    #[must_use]
    pub fn build(self) -> Scheduler {
        Scheduler::from_builder(self)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
