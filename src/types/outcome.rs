//! Fiber outcomes.
//!
//! Every fiber finishes with an [`Exit`]: either its value or a [`Cause`]
//! describing why no value was produced. A cause is one of
//!
//! - `Failure(E)`: the body returned a typed error
//! - `Cancelled(CancelReason)`: the fiber observed a cancellation request
//! - `Panicked(PanicPayload)`: the body panicked
//! - `Composite(..)`: several of the above, for example a body failure
//!   followed by a failing finalizer
//!
//! Finalizers receive an [`ExitCase`], a cloned view of how the guarded
//! action ended.

use super::cancel::{CancelReason, Cancelled};
use core::fmt;
use std::any::Any;

/// Payload from a caught panic.
///
/// This wraps the panic value for safe transport across fiber boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts a message from a value caught by `catch_unwind`.
    #[must_use]
    pub fn from_unwind(payload: &(dyn Any + Send)) -> Self {
        if let Some(msg) = payload.downcast_ref::<&'static str>() {
            Self::new(*msg)
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            Self::new(msg.clone())
        } else {
            Self::new("non-string panic payload")
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// Why a fiber produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause<E> {
    /// Application-level error.
    Failure(E),
    /// The fiber observed a cancellation request.
    Cancelled(CancelReason),
    /// The fiber panicked.
    Panicked(PanicPayload),
    /// Several causes, in the order they occurred. Never nested, never empty.
    Composite(Vec<Cause<E>>),
}

/// The outcome of a fiber or guarded action.
pub type Exit<T, E> = Result<T, Cause<E>>;

impl<E> Cause<E> {
    /// Returns true if this is a typed failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns true if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if this is a panic.
    #[must_use]
    pub const fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Returns true if this cause aggregates several causes.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// Returns the typed failure, if this is one.
    #[must_use]
    pub const fn failure(&self) -> Option<&E> {
        match self {
            Self::Failure(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes the cause and returns the typed failure, if this is one.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failure(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the cancellation reason, if this is a cancellation.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }

    /// Appends `other` after `self`, flattening composites.
    #[must_use]
    pub fn compose(self, other: Self) -> Self {
        let mut causes = self.into_leaves();
        causes.extend(other.into_leaves());
        Self::Composite(causes)
    }

    /// Returns the leaf causes in order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        match self {
            Self::Composite(causes) => causes.iter().flat_map(Self::leaves).collect(),
            leaf => vec![leaf],
        }
    }

    fn into_leaves(self) -> Vec<Self> {
        match self {
            Self::Composite(causes) => causes.into_iter().flat_map(Self::into_leaves).collect(),
            leaf => vec![leaf],
        }
    }

    /// Maps the typed failure.
    pub fn map<F>(self, f: impl Fn(E) -> F) -> Cause<F> {
        self.map_with(&f)
    }

    fn map_with<F>(self, f: &dyn Fn(E) -> F) -> Cause<F> {
        match self {
            Self::Failure(e) => Cause::Failure(f(e)),
            Self::Cancelled(reason) => Cause::Cancelled(reason),
            Self::Panicked(payload) => Cause::Panicked(payload),
            Self::Composite(causes) => {
                Cause::Composite(causes.into_iter().map(|c| c.map_with(f)).collect())
            }
        }
    }
}

impl<E> From<Cancelled> for Cause<E> {
    fn from(cancelled: Cancelled) -> Self {
        Self::Cancelled(cancelled.reason)
    }
}

impl<E: fmt::Display> fmt::Display for Cause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure(e) => write!(f, "failure: {e}"),
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
            Self::Panicked(payload) => write!(f, "{payload}"),
            Self::Composite(causes) => {
                write!(f, "composite [")?;
                for (i, cause) in causes.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{cause}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Cause<E> {}

/// How a guarded action ended, as seen by its finalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCase<T, E> {
    /// The action produced a value.
    Completed(T),
    /// The action observed a cancellation request.
    Cancelled(CancelReason),
    /// The action failed or panicked.
    Error(Cause<E>),
}

impl<T, E> ExitCase<T, E> {
    /// Builds the finalizer view of an exit.
    #[must_use]
    pub fn from_exit(exit: &Exit<T, E>) -> Self
    where
        T: Clone,
        E: Clone,
    {
        match exit {
            Ok(value) => Self::Completed(value.clone()),
            Err(cause) => Self::from_cause(cause.clone()),
        }
    }

    /// Classifies a cause: a bare cancellation becomes `Cancelled`, anything
    /// else is an `Error`.
    #[must_use]
    pub fn from_cause(cause: Cause<E>) -> Self {
        match cause {
            Cause::Cancelled(reason) => Self::Cancelled(reason),
            other => Self::Error(other),
        }
    }

    /// Returns true if the action completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns true if the action was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if the action failed or panicked.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Forgets the completed value.
    pub fn discard(self) -> ExitCase<(), E> {
        match self {
            Self::Completed(_) => ExitCase::Completed(()),
            Self::Cancelled(reason) => ExitCase::Cancelled(reason),
            Self::Error(cause) => ExitCase::Error(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use crate::types::CancelKind;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn compose_flattens_composites() {
        init_test("compose_flattens_composites");
        let a: Cause<&str> = Cause::Failure("a");
        let b = Cause::Failure("b").compose(Cause::Panicked(PanicPayload::new("c")));
        let all = a.compose(b);
        let leaves = all.leaves().len();
        crate::assert_with_log!(leaves == 3, "three leaves", 3, leaves);
        let nested = matches!(&all, Cause::Composite(v) if v.iter().all(|c| !c.is_composite()));
        crate::assert_with_log!(nested, "composite is flat", true, nested);
        crate::test_complete!("compose_flattens_composites");
    }

    #[test]
    fn exit_case_classifies_cancellation() {
        init_test("exit_case_classifies_cancellation");
        let exit: Exit<u8, &str> = Err(Cause::Cancelled(CancelReason::timeout()));
        let case = ExitCase::from_exit(&exit);
        crate::assert_with_log!(
            case == ExitCase::Cancelled(CancelReason::timeout()),
            "cancelled exit",
            "Cancelled(timeout)",
            case
        );

        let exit: Exit<u8, &str> = Err(Cause::Failure("boom"));
        let case = ExitCase::from_exit(&exit);
        crate::assert_with_log!(case.is_error(), "failure exit", "Error", case);

        let case = ExitCase::<u8, &str>::from_exit(&Ok(4)).discard();
        crate::assert_with_log!(
            case == ExitCase::Completed(()),
            "completed exit",
            "Completed(())",
            case
        );
        crate::test_complete!("exit_case_classifies_cancellation");
    }

    #[test]
    fn cancelled_converts_into_cause() {
        init_test("cancelled_converts_into_cause");
        let cause: Cause<()> = Cancelled::new(CancelReason::new(CancelKind::RaceLost)).into();
        let reason = cause.cancel_reason().map(|r| r.kind);
        crate::assert_with_log!(
            reason == Some(CancelKind::RaceLost),
            "reason kept",
            Some(CancelKind::RaceLost),
            reason
        );
        crate::test_complete!("cancelled_converts_into_cause");
    }

    #[test]
    fn panic_payload_reads_string_values() {
        init_test("panic_payload_reads_string_values");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaput"));
        let payload = PanicPayload::from_unwind(boxed.as_ref());
        crate::assert_with_log!(
            payload.message() == "kaput",
            "message",
            "kaput",
            payload.message()
        );
        crate::test_complete!("panic_payload_reads_string_values");
    }

    #[test]
    fn display_lists_composite_parts() {
        init_test("display_lists_composite_parts");
        let cause: Cause<&str> = Cause::Failure("x").compose(Cause::Failure("y"));
        let text = cause.to_string();
        crate::assert_with_log!(
            text == "composite [failure: x; failure: y]",
            "display",
            "composite [failure: x; failure: y]",
            text
        );
        crate::test_complete!("display_lists_composite_parts");
    }
}
