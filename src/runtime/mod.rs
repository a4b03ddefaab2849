//! Executor substrate.
//!
//! - [`config`]: runtime configuration and its defaults
//! - [`builder`]: `RuntimeBuilder`, `Runtime` and `RuntimeHandle`
//! - [`context`]: execution contexts (worker pools)
//! - [`yield_now`]: cooperative yield
//!
//! Tasks, the run queue and the timer driver are internal.

pub mod builder;
pub mod config;
pub mod context;
mod scheduler;
mod stored_task;
pub(crate) mod task;
pub(crate) mod timer;
pub mod yield_now;

pub use builder::{Runtime, RuntimeBuilder, RuntimeHandle};
pub use config::RuntimeConfig;
pub use context::{ContextKind, ExecutionContext};
pub use yield_now::{YieldNow, yield_now};
