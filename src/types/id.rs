//! Identifier types for runtime entities.
//!
//! Identifiers are process-unique counters. They are opaque to callers and
//! are used for logging, debugging and STM bookkeeping.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TVAR_ID: AtomicU64 = AtomicU64::new(1);

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident, $counter:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Allocates the next identifier.
            #[must_use]
            pub(crate) fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            /// Creates an identifier from a raw value (for testing only).
            #[doc(hidden)]
            #[must_use]
            pub const fn new_for_test(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

counter_id!(
    /// Identifies a task: a fiber body or a raw future submitted to a context.
    TaskId,
    NEXT_TASK_ID,
    "T"
);

counter_id!(
    /// Identifies an execution context (thread pool).
    ContextId,
    NEXT_CONTEXT_ID,
    "C"
);

counter_id!(
    /// Identifies a transactional variable.
    TVarId,
    NEXT_TVAR_ID,
    "V"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        init_test("ids_are_unique_and_increasing");
        let a = TaskId::next();
        let b = TaskId::next();
        crate::assert_with_log!(a < b, "ids increase", true, a < b);
        crate::assert_with_log!(a != b, "ids differ", true, a != b);
        crate::test_complete!("ids_are_unique_and_increasing");
    }

    #[test]
    fn display_and_debug_formats() {
        init_test("display_and_debug_formats");
        let id = TVarId::new_for_test(7);
        crate::assert_with_log!(id.to_string() == "V7", "display", "V7", id.to_string());
        let debug_str = format!("{:?}", ContextId::new_for_test(3));
        crate::assert_with_log!(debug_str == "ContextId(3)", "debug", "ContextId(3)", debug_str);
        crate::test_complete!("display_and_debug_formats");
    }
}
