//! Test utilities for fiberguard.
//!
//! Shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Small runtime constructors and a `block_on` runner
//! - Exit assertion macros
//!
//! # Example
//! ```
//! use fiberguard::test_utils::{init_test_logging, run_test};
//! use fiberguard::types::Exit;
//!
//! init_test_logging();
//! let exit: Exit<u32, ()> = run_test(|_cx| async { Ok(7) });
//! assert_eq!(exit, Ok(7));
//! ```

use crate::cx::Cx;
use crate::runtime::{Runtime, RuntimeBuilder};
use crate::types::Exit;
use std::future::Future;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Build a small runtime for tests: two compute workers, two blocking workers.
#[must_use]
pub fn test_runtime() -> Runtime {
    RuntimeBuilder::new()
        .compute_threads(2)
        .blocking_threads(2)
        .thread_name_prefix("fiberguard-test")
        .build()
        .expect("failed to build test runtime")
}

/// Run a root fiber on a fresh test runtime and return its exit.
pub fn run_test<T, E, F, Fut>(f: F) -> Exit<T, E>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Exit<T, E>>,
{
    init_test_logging();
    let runtime = test_runtime();
    runtime.block_on(f)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that an exit is `Ok` with a specific value.
#[macro_export]
macro_rules! assert_exit_ok {
    ($exit:expr, $expected:expr) => {
        match $exit {
            Ok(v) => assert_eq!(v, $expected),
            Err(cause) => panic!("expected Ok({:?}), got {:?}", $expected, cause),
        }
    };
}

/// Assert that an exit is a bare cancellation.
#[macro_export]
macro_rules! assert_exit_cancelled {
    ($exit:expr) => {
        match $exit {
            Err($crate::types::Cause::Cancelled(_)) => {}
            other => panic!("expected Cancelled, got {:?}", other),
        }
    };
}

/// Assert that an exit is a typed failure equal to `$expected`.
#[macro_export]
macro_rules! assert_exit_failure {
    ($exit:expr, $expected:expr) => {
        match $exit {
            Err($crate::types::Cause::Failure(e)) => assert_eq!(e, $expected),
            other => panic!("expected Failure({:?}), got {:?}", $expected, other),
        }
    };
}
