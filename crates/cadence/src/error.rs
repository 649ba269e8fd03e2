// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

/// The result type returned by fiber bodies.
///
/// An `Err` returned from a fiber body terminates the fiber in the
/// [`Failed`][crate::FiberState::Failed] state.
pub type Result<T> = std::result::Result<T, FiberError>;

/// The reason a fiber failed.
///
/// The error is stored on the fiber's [`Handle`][crate::Handle] so that every holder of the
/// handle, including fibers awaiting it, can observe it. Cloning is cheap: all clones share the
/// same underlying error.
///
/// Any [`std::error::Error`] converts into a `FiberError`, so the `?` operator works inside fiber
/// bodies:
///
/// ```
/// use cadence::FiberError;
///
/// fn parse_port(text: &str) -> cadence::Result<u16> {
///     Ok(text.parse::<u16>()?)
/// }
///
/// let error: FiberError = parse_port("not a port").unwrap_err();
/// assert_eq!(error.to_string(), "invalid digit found in string");
/// ```
///
/// # Limited introspection
///
/// Other than [`is_panic`][Self::is_panic], [`is_cancelled`][Self::is_cancelled],
/// [`source`][Self::source] and [`downcast_ref`][Self::downcast_ref], this error type provides no
/// introspection capabilities.
#[derive(Clone)]
pub struct FiberError(Rc<ErrorKind>);

#[derive(Debug, thiserror::Error)]
enum ErrorKind {
    #[error("{0}")]
    Message(Cow<'static, str>),

    #[error("fiber panicked: {0}")]
    Panicked(String),

    #[error("awaited fiber was cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(Box<dyn std::error::Error + 'static>),
}

impl FiberError {
    /// Wraps an arbitrary error.
    pub fn new(error: impl std::error::Error + 'static) -> Self {
        Self(Rc::new(ErrorKind::Other(Box::new(error))))
    }

    /// Creates an error from a human-readable message.
    ///
    /// # Examples
    ///
    /// ```
    /// use cadence::FiberError;
    ///
    /// let error = FiberError::msg("master server refused registration");
    /// assert_eq!(error.to_string(), "master server refused registration");
    /// ```
    pub fn msg(message: impl Into<Cow<'static, str>>) -> Self {
        Self(Rc::new(ErrorKind::Message(message.into())))
    }

    pub(crate) fn panicked(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "opaque panic payload".to_owned()
        };

        Self(Rc::new(ErrorKind::Panicked(message)))
    }

    pub(crate) fn cancelled() -> Self {
        Self(Rc::new(ErrorKind::Cancelled))
    }

    /// Returns `true` if the fiber failed because its body panicked.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(*self.0, ErrorKind::Panicked(_))
    }

    /// Returns `true` if this error reports that an awaited fiber was cancelled.
    ///
    /// Such errors come from [`Outcome::into_result`][crate::Outcome::into_result].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.0, ErrorKind::Cancelled)
    }

    /// Returns the wrapped error, if this error was created from another error.
    #[must_use]
    pub fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.0 {
            ErrorKind::Other(error) => Some(error.as_ref()),
            ErrorKind::Message(_) | ErrorKind::Panicked(_) | ErrorKind::Cancelled => None,
        }
    }

    /// Attempts to downcast the wrapped error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.source().and_then(|error| error.downcast_ref::<E>())
    }
}

impl<E> From<E> for FiberError
where
    E: std::error::Error + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for FiberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for FiberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
