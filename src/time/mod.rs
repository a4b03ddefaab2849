//! Time-based suspension.
//!
//! - [`sleep`]: cancellation-aware delay driven by the runtime's timer thread

pub mod sleep;

pub use sleep::{Sleep, sleep, sleep_until};
