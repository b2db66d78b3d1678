//! Error types and result definitions for weave operations.
//!
//! Provides a classified error type with captured diagnostic metadata. The [`WeaveError`] type
//! supports single errors, errors with additional detail, and multiple aggregated errors, which
//! is how failures of several concurrent units are reported together.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::concurrency::cancel::CancelCause;

/// Convenient result type for weave operations using [`WeaveError`] as the error type.
pub type WeaveResult<T> = Result<T, WeaveError>;

/// Detailed payload stored for single [`WeaveError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for weave operations.
///
/// [`WeaveError`] can represent a single classified error or an aggregate of several errors.
/// Equality compares error kinds only, so tests can match on the category of a failure without
/// caring about where it was raised.
#[derive(Debug, Clone)]
pub struct WeaveError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors, mainly used to report failures of several workers.
    Many {
        errors: Vec<WeaveError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur while coordinating concurrent work.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Pool Errors
    PoolClosed,
    SubmitCanceled,
    PoolCanceled,

    // Cancellation Errors
    Canceled,
    DeadlineExceeded,

    // Task & Worker Errors
    TaskFailed,
    TaskPanic,
    WorkerPanic,

    // Unknown / Uncategorized
    Unknown,
}

impl WeaveError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description of this error.
    ///
    /// For multiple errors, returns the description of the first one.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("multiple errors"),
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, if this is an aggregate.
    pub fn errors(&self) -> Option<&[WeaveError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns the [`CancelCause`] this error represents, if it is a cancellation error.
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self.kind() {
            ErrorKind::Canceled => Some(CancelCause::Canceled),
            ErrorKind::DeadlineExceeded => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        WeaveError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source: None,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for WeaveError {
    fn eq(&self, other: &WeaveError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for WeaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail:")?;
                    for line in detail.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    if let Some(first_line) = lines.next() {
                        write!(f, "\n  {}. {}", index + 1, first_line)?;
                    }
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for WeaveError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`WeaveError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for WeaveError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> WeaveError {
        WeaveError::from_components(kind, Cow::Borrowed(desc), None)
    }
}

/// Creates a [`WeaveError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for WeaveError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> WeaveError {
        WeaveError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()))
    }
}

/// Creates a [`WeaveError`] aggregating a vector of errors.
///
/// A vector with exactly one error yields that error unwrapped.
impl<E> From<Vec<E>> for WeaveError
where
    E: Into<WeaveError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> WeaveError {
        let location = Location::caller();
        let mut errors: Vec<WeaveError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        WeaveError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts a [`CancelCause`] into the matching cancellation error.
impl From<CancelCause> for WeaveError {
    #[track_caller]
    fn from(cause: CancelCause) -> WeaveError {
        match cause {
            CancelCause::Canceled => {
                WeaveError::from_components(ErrorKind::Canceled, Cow::Borrowed("context canceled"), None)
            }
            CancelCause::DeadlineExceeded => WeaveError::from_components(
                ErrorKind::DeadlineExceeded,
                Cow::Borrowed("context deadline exceeded"),
                None,
            ),
        }
    }
}

/// Converts a [`tokio::task::JoinError`] into [`ErrorKind::WorkerPanic`] or [`ErrorKind::Canceled`].
impl From<tokio::task::JoinError> for WeaveError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> WeaveError {
        let (kind, description) = if err.is_cancelled() {
            (ErrorKind::Canceled, "worker task was aborted")
        } else {
            (ErrorKind::WorkerPanic, "worker task panicked")
        };

        WeaveError::from_components(kind, Cow::Borrowed(description), Some(Cow::Owned(err.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, weave_error};

    fn failing() -> WeaveResult<()> {
        bail!(ErrorKind::TaskFailed, "task returned an error", "attempt = 3");
    }

    #[test]
    fn test_kind_and_detail_are_preserved() {
        let err = failing().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskFailed);
        assert_eq!(err.description(), "task returned an error");
        assert_eq!(err.detail(), Some("attempt = 3"));
        assert!(err.to_string().contains("[TaskFailed]"));
    }

    #[test]
    fn test_empty_aggregate_is_unknown() {
        let empty: WeaveError = Vec::<WeaveError>::new().into();
        assert_eq!(empty.kind(), ErrorKind::Unknown);
        assert!(empty.kinds().is_empty());
    }

    #[test]
    fn test_cancel_cause_round_trips_through_kind() {
        let err: WeaveError = CancelCause::DeadlineExceeded.into();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert_eq!(err.cancel_cause(), Some(CancelCause::DeadlineExceeded));

        let err = weave_error!(ErrorKind::PoolClosed, "pool closed");
        assert_eq!(err.cancel_cause(), None);
    }

    #[test]
    fn test_many_flattens_kinds_and_unwraps_single() {
        let single: WeaveError = vec![weave_error!(ErrorKind::TaskFailed, "task failed")].into();
        assert!(single.errors().is_none());
        assert_eq!(single.kind(), ErrorKind::TaskFailed);

        let many: WeaveError = vec![
            weave_error!(ErrorKind::TaskPanic, "task panicked"),
            weave_error!(ErrorKind::WorkerPanic, "worker panicked"),
        ]
        .into();
        assert_eq!(many.kinds(), vec![ErrorKind::TaskPanic, ErrorKind::WorkerPanic]);
        assert_eq!(many.kind(), ErrorKind::TaskPanic);
        assert!(many.to_string().starts_with("[Many] 2 errors"));
    }

    #[test]
    fn test_equality_ignores_location() {
        let a = weave_error!(ErrorKind::SubmitCanceled, "submit canceled");
        let b = weave_error!(ErrorKind::SubmitCanceled, "submit canceled", "other detail");
        assert_eq!(a, b);
        assert_ne!(a, weave_error!(ErrorKind::PoolCanceled, "pool canceled"));
    }
}
