//! Explicit cancellation boundaries.

use crate::cx::Cx;
use crate::runtime::yield_now;
use crate::types::Cancelled;
use std::future::Future;

/// A checkpoint that also yields to the scheduler.
///
/// Long computations call this between steps so cancellation can be
/// observed and other fibers on the same context get to run.
///
/// # Errors
///
/// Returns [`Cancelled`] if an unmasked request is pending before or after
/// the yield.
pub async fn cancel_boundary(cx: &Cx) -> Result<(), Cancelled> {
    cx.checkpoint()?;
    yield_now().await;
    cx.checkpoint()
}

/// Runs `fut` with cancellation masked. See [`Cx::uncancellable`].
///
/// # Errors
///
/// Returns [`Cancelled`] if cancellation was pending on entry.
pub async fn uncancellable<F: Future>(cx: &Cx, fut: F) -> Result<F::Output, Cancelled> {
    cx.uncancellable(fut).await
}

/// Suspends until the caller is cancelled.
pub async fn never<T>(cx: &Cx) -> Result<T, Cancelled> {
    Err(Cancelled::new(cx.cancelled().await))
}
