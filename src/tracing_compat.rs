//! Structured logging facade.
//!
//! With the `tracing-integration` feature enabled this module re-exports the
//! `tracing` macros. Without it, the same macro names expand to nothing so
//! the kernel carries no logging cost.
//!
//! ```rust,ignore
//! use fiberguard::tracing_compat::{debug, trace};
//!
//! debug!(task = %id, "fiber forked");
//! let _span = fiberguard::tracing_compat::info_span!("scope").entered();
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, debug_span, error, info, info_span, trace, trace_span, warn, Level, Span};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op macros used when tracing is disabled.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op info-level logging macro.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    /// No-op trace_span macro.
    #[macro_export]
    macro_rules! trace_span {
        ($($arg:tt)*) => {
            $crate::tracing_compat::NoopSpan
        };
    }

    /// No-op debug_span macro.
    #[macro_export]
    macro_rules! debug_span {
        ($($arg:tt)*) => {
            $crate::tracing_compat::NoopSpan
        };
    }

    /// No-op info_span macro.
    #[macro_export]
    macro_rules! info_span {
        ($($arg:tt)*) => {
            $crate::tracing_compat::NoopSpan
        };
    }

    pub use crate::{debug, debug_span, error, info, info_span, trace, trace_span, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;

/// A span that records nothing.
///
/// Span macros return this type when tracing is disabled so that
/// `span.entered()` compiles either way.
#[cfg(not(feature = "tracing-integration"))]
#[derive(Debug, Clone, Copy)]
pub struct NoopSpan;

#[cfg(not(feature = "tracing-integration"))]
impl NoopSpan {
    /// Returns a guard that does nothing on drop.
    #[inline]
    #[must_use]
    pub fn enter(&self) -> NoopGuard {
        NoopGuard
    }

    /// Returns self.
    #[inline]
    #[must_use]
    pub fn entered(self) -> Self {
        self
    }

    /// Records a value (no-op).
    #[inline]
    pub fn record<V>(&self, _field: &str, _value: V) {}
}

/// A span guard that does nothing on drop.
#[cfg(not(feature = "tracing-integration"))]
#[derive(Debug)]
pub struct NoopGuard;

/// Level placeholder when tracing is disabled.
#[cfg(not(feature = "tracing-integration"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Level;

#[cfg(not(feature = "tracing-integration"))]
impl Level {
    /// Trace level.
    pub const TRACE: Self = Self;
    /// Debug level.
    pub const DEBUG: Self = Self;
    /// Info level.
    pub const INFO: Self = Self;
    /// Warn level.
    pub const WARN: Self = Self;
    /// Error level.
    pub const ERROR: Self = Self;
}

/// Alias for `NoopSpan` when tracing is disabled.
#[cfg(not(feature = "tracing-integration"))]
pub type Span = NoopSpan;
