//! Core types for the fiberguard runtime.
//!
//! - [`id`]: Identifier types (`TaskId`, `ContextId`, `TVarId`)
//! - [`cancel`]: Cancellation reason, kind and state types
//! - [`outcome`]: `Cause`, `Exit` and `ExitCase`

pub mod cancel;
pub mod id;
pub mod outcome;

pub use cancel::{CancelKind, CancelReason, CancelState, Cancelled};
pub use id::{ContextId, TVarId, TaskId};
pub use outcome::{Cause, Exit, ExitCase, PanicPayload};
