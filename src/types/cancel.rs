//! Why a fiber is asked to stop, and how far along the stop is.
//!
//! A [`CancelReason`] travels with every request. When several requests
//! reach the same signal, the reason is only ever strengthened: a more severe
//! kind replaces a milder one, never the other way round.

use core::fmt;

/// Where a cancellation request came from.
///
/// Listed from mildest to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Requested through a fiber handle or a trigger.
    User,
    /// A deadline elapsed.
    Timeout,
    /// A sibling in a parallel combinator failed.
    FailFast,
    /// Another racer finished first.
    RaceLost,
    /// The owning fiber finished while this one was still running.
    ScopeClosed,
    /// The parent fiber was cancelled.
    ParentCancelled,
    /// The runtime is shutting down.
    Shutdown,
}

impl CancelKind {
    /// Precedence used when two requests meet on one signal.
    ///
    /// Kinds sharing a severity are equally strong; the first one stays.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Timeout => 1,
            Self::FailFast | Self::RaceLost => 2,
            Self::ScopeClosed | Self::ParentCancelled => 3,
            Self::Shutdown => 4,
        }
    }

    /// Short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Timeout => "timeout",
            Self::FailFast => "fail-fast",
            Self::RaceLost => "race lost",
            Self::ScopeClosed => "scope closed",
            Self::ParentCancelled => "parent cancelled",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cancellation request: its kind and an optional static note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// Where the request came from.
    pub kind: CancelKind,
    /// Free-form context, if the requester gave any.
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// A reason of the given kind with no message.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// A user request with a note.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self::new(CancelKind::User).with_message(message)
    }

    /// Attaches a note.
    #[must_use]
    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    /// A deadline elapsed.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// A sibling failed.
    #[must_use]
    pub const fn sibling_failed() -> Self {
        Self::new(CancelKind::FailFast)
    }

    /// Another racer won.
    #[must_use]
    pub const fn race_lost() -> Self {
        Self::new(CancelKind::RaceLost)
    }

    /// The owner finished first.
    #[must_use]
    pub const fn scope_closed() -> Self {
        Self::new(CancelKind::ScopeClosed)
    }

    /// The parent was cancelled.
    #[must_use]
    pub const fn parent_cancelled() -> Self {
        Self::new(CancelKind::ParentCancelled)
    }

    /// The runtime is stopping.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }

    /// Returns the kind of request.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }

    /// Returns true for runtime shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self.kind, CancelKind::Shutdown)
    }

    /// Folds a later request into this one and reports whether anything
    /// changed.
    ///
    /// A strictly more severe kind replaces kind and message together. At
    /// equal severity only the message may change: a missing one is filled
    /// in, and between two messages the lexicographically smaller one is
    /// kept so the outcome does not depend on arrival order.
    pub fn strengthen(&mut self, later: &Self) -> bool {
        let (mine, theirs) = (self.kind.severity(), later.kind.severity());
        if theirs != mine {
            if theirs > mine {
                *self = later.clone();
            }
            return theirs > mine;
        }
        let better = match (self.message, later.message) {
            (None, Some(_)) => true,
            (Some(kept), Some(offered)) => offered < kept,
            _ => false,
        };
        if better {
            self.message = later.message;
        }
        better
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            Some(note) => write!(f, "{}: {note}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Progress of a signal through the stop protocol.
///
/// Only moves forward: `Active`, then `CancelRequested`, then `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CancelState {
    /// Nobody has asked the fiber to stop.
    Active = 0,
    /// A request is recorded; the fiber is still running or unwinding.
    CancelRequested = 1,
    /// The fiber has finished after a request.
    Cancelled = 2,
}

impl CancelState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::CancelRequested,
            _ => Self::Cancelled,
        }
    }

    /// True for every state past `Active`.
    #[must_use]
    pub const fn is_requested(self) -> bool {
        (self as u8) > (Self::Active as u8)
    }
}

impl fmt::Display for CancelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::CancelRequested => "cancel requested",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Returned by a checkpoint that found an unmasked request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cancelled ({reason})")]
pub struct Cancelled {
    /// The request that was observed.
    pub reason: CancelReason,
}

impl Cancelled {
    /// Wraps an observed request.
    #[must_use]
    pub const fn new(reason: CancelReason) -> Self {
        Self { reason }
    }

    /// Borrows the observed request.
    #[must_use]
    pub const fn reason(&self) -> &CancelReason {
        &self.reason
    }
}

impl From<CancelReason> for Cancelled {
    fn from(reason: CancelReason) -> Self {
        Self::new(reason)
    }
}
