//! Sleeping.
//!
//! A sleep is a checkpoint on entry and a cancellation-aware suspension
//! point while it waits: an unmasked request ends it early with
//! [`Cancelled`]. Inside an uncancellable section it always runs to its
//! deadline.

use crate::cx::Cx;
use crate::runtime::timer::TimerKey;
use crate::types::Cancelled;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Sleeps for `duration`.
///
/// A duration too large to express as an [`Instant`] never elapses: the
/// sleep then ends only through cancellation.
///
/// # Errors
///
/// Returns [`Cancelled`] if cancellation is pending on entry or is
/// requested (unmasked) while sleeping.
pub async fn sleep(cx: &Cx, duration: Duration) -> Result<(), Cancelled> {
    cx.checkpoint()?;
    Sleep::after(cx, duration).await
}

/// Sleeps until `deadline`.
///
/// # Errors
///
/// See [`sleep`].
pub async fn sleep_until(cx: &Cx, deadline: Instant) -> Result<(), Cancelled> {
    cx.checkpoint()?;
    Sleep::new(cx, deadline).await
}

/// Future returned by [`sleep`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    cx: Cx,
    deadline: Option<Instant>,
    key: Option<TimerKey>,
}

impl Sleep {
    /// Creates a sleep that ends at `deadline`. Entry is not a checkpoint.
    pub fn new(cx: &Cx, deadline: Instant) -> Self {
        Self::with_deadline(cx, Some(deadline))
    }

    /// Creates a sleep that ends `duration` from now, or never if that
    /// instant is out of range. Entry is not a checkpoint.
    pub fn after(cx: &Cx, duration: Duration) -> Self {
        Self::with_deadline(cx, Instant::now().checked_add(duration))
    }

    fn with_deadline(cx: &Cx, deadline: Option<Instant>) -> Self {
        Self {
            cx: cx.clone(),
            deadline,
            key: None,
        }
    }

    /// Returns the deadline, or `None` for a sleep that never elapses.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn release(&mut self) {
        if let Some(key) = self.key.take() {
            self.cx.runtime().timer().cancel(key);
        }
    }
}

impl Future for Sleep {
    type Output = Result<(), Cancelled>;

    fn poll(mut self: Pin<&mut Self>, task_cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.release();
            return Poll::Ready(Ok(()));
        }
        if let Poll::Ready(reason) = self.cx.poll_cancel(task_cx) {
            self.release();
            return Poll::Ready(Err(Cancelled::new(reason)));
        }
        // Without a deadline only a cancellation wakeup can end the sleep.
        let Some(deadline) = self.deadline else {
            return Poll::Pending;
        };
        match self.key {
            Some(key) => self.cx.runtime().timer().update_waker(key, task_cx.waker()),
            None => {
                let key = self.cx.runtime().timer().register(deadline, task_cx.waker());
                self.key = Some(key);
            }
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        self.release();
    }
}
