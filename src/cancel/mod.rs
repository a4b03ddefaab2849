//! Cooperative cancellation.
//!
//! - [`signal`]: per-fiber signals linked into a parent/child tree
//! - [`trigger`]: free-standing cancellation sources for scoped forks

pub mod signal;
pub mod trigger;

pub use signal::CancelSignal;
pub use trigger::CancelTrigger;
