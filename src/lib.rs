//! fiberguard: cancel-correct fibers, bracketed resources, retry schedules
//! and software transactional memory over Rust futures.
//!
//! # Overview
//!
//! Every fiber carries a [`Cx`], a capability context holding its node in a
//! cancellation tree. Cancellation is cooperative: a request is recorded at
//! once and observed at the next checkpoint. Suspension points (sleeping,
//! joining, waiting for a permit, blocking in a transaction) are
//! checkpoints, and [`Cx::uncancellable`] defers observation until a critical
//! section ends.
//!
//! # Core Guarantees
//!
//! - **Release always runs**: [`bracket_case`] and [`Resource`] release on
//!   success, failure, cancellation and panic, in reverse acquisition order
//! - **No orphans**: a fiber whose body returns while connected children are
//!   live cancels and drains them before it reports its own exit
//! - **Cancel means unwound**: [`Fiber::cancel`] returns only after the whole
//!   subtree has finished releasing
//! - **Original causes**: a failing branch surfaces its own error, and a
//!   failing release is composed with the cause it interrupted
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, cancellation reasons and exit causes
//! - [`cancel`]: the cancellation signal tree and external triggers
//! - [`cx`]: the per-fiber capability context
//! - [`runtime`]: execution contexts, the timer and the root runtime
//! - [`fiber`]: forking, joining and cancelling fibers, and `eval_on`
//! - [`combinator`]: bracket, resources, parallel maps, races, timeouts
//! - [`schedule`]: composable repeat and retry policies
//! - [`stm`]: transactional variables, arrays and queues
//! - [`sync`]: cancel-aware semaphore and compare-and-swap reference
//! - [`time`]: cancellable sleep
//! - [`error`](mod@error): runtime-level errors
//! - [`tracing_compat`]: optional tracing integration
//!
//! # Example
//!
//! ```ignore
//! use fiberguard::{Cause, RuntimeBuilder, par_traverse};
//!
//! let runtime = RuntimeBuilder::new().compute_threads(4).build()?;
//! let exit = runtime.block_on(|cx| async move {
//!     let ctx = cx.runtime().compute();
//!     par_traverse(&cx, ctx, vec![1, 2, 3], |_cx, n| async move { Ok::<_, Cause<()>>(n * 2) }).await
//! });
//! assert_eq!(exit, Ok(vec![2, 4, 6]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::future_not_send)]

pub mod cancel;
pub mod combinator;
pub mod cx;
pub mod error;
pub mod fiber;
pub mod runtime;
pub mod schedule;
pub mod stm;
pub mod sync;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod util;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use cancel::{CancelSignal, CancelTrigger};
pub use combinator::{
    Either, Resource, bracket, bracket_case, cancel_boundary, par_map2, par_traverse, race_n,
    timeout_or_none, uncancellable,
};
pub use cx::Cx;
pub use error::{Error, ErrorKind, Result};
pub use fiber::{Fiber, FiberStatus, eval_on, fork_and_forget, fork_connected, fork_scoped};
pub use runtime::{ExecutionContext, Runtime, RuntimeBuilder, RuntimeConfig, RuntimeHandle};
pub use schedule::{Decision, Schedule, repeat, retry};
pub use stm::{TArray, TQueue, TVar, Txn, atomically};
pub use sync::{AtomicRef, Semaphore};
pub use time::sleep;
pub use types::{
    CancelKind, CancelReason, CancelState, Cancelled, Cause, ContextId, Exit, ExitCase,
    PanicPayload, TVarId, TaskId,
};
