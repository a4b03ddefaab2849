//! Fiber capability context.
//!
//! See [`Cx`] for checkpoints, masking and cancellation-aware suspension.

#[allow(clippy::module_inception)]
mod cx;

pub use cx::Cx;
