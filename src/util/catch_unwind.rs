//! Panic capture for fiber bodies and finalizers.

use crate::types::{Cause, Exit, PanicPayload};
use pin_project::pin_project;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future adapter that turns a panic during `poll` into a [`PanicPayload`].
#[pin_project]
pub(crate) struct CatchUnwind<F> {
    #[pin]
    future: F,
}

impl<F> CatchUnwind<F> {
    pub(crate) fn new(future: F) -> Self {
        Self { future }
    }
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = Result<F::Output, PanicPayload>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut future = self.project().future;
        match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(cx))) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(PanicPayload::from_unwind(payload.as_ref()))),
        }
    }
}

/// Builds a future with `make` and drives it, capturing a panic from either
/// step.
pub(crate) async fn guarded<Fut, M>(make: M) -> Result<Fut::Output, PanicPayload>
where
    M: FnOnce() -> Fut,
    Fut: Future,
{
    let future = catch_unwind(AssertUnwindSafe(make))
        .map_err(|payload| PanicPayload::from_unwind(payload.as_ref()))?;
    CatchUnwind::new(future).await
}

/// Like [`guarded`], folding a panic into the exit.
pub(crate) async fn guarded_exit<T, E, Fut, M>(make: M) -> Exit<T, E>
where
    M: FnOnce() -> Fut,
    Fut: Future<Output = Exit<T, E>>,
{
    guarded(make)
        .await
        .unwrap_or_else(|payload| Err(Cause::Panicked(payload)))
}
