//! Cancel-aware counting semaphore.
//!
//! Waiting for a permit is a suspension point: an unmasked cancellation
//! request ends the wait with [`AcquireError::Cancelled`] and no permit is
//! taken. Permits are returned when the permit guard drops, so a fiber that
//! unwinds through cancellation or a panic never leaks one.
//!
//! # Example
//!
//! ```ignore
//! let sem = Arc::new(Semaphore::new(4));
//! let permit = sem.acquire_owned(&cx, 1).await?;
//! // at most four fibers are here at once
//! drop(permit);
//! ```

use crate::cx::Cx;
use crate::types::{CancelReason, Cause};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Error returned when semaphore acquisition fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// The semaphore was closed.
    #[error("semaphore closed")]
    Closed,
    /// Cancelled while waiting.
    #[error("semaphore acquire cancelled: {0}")]
    Cancelled(CancelReason),
}

impl<E> From<AcquireError> for Cause<E> {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Closed => Self::Cancelled(CancelReason::shutdown()),
            AcquireError::Cancelled(reason) => Self::Cancelled(reason),
        }
    }
}

/// Error returned when permits are not immediately available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no semaphore permits available")]
pub struct TryAcquireError;

/// A counting semaphore for limiting concurrent access.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemaphoreState>,
    max_permits: usize,
}

#[derive(Debug)]
struct SemaphoreState {
    permits: usize,
    closed: bool,
    waiters: SmallVec<[Waker; 4]>,
}

impl Semaphore {
    /// Creates a new semaphore with the given number of permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                permits,
                closed: false,
                waiters: SmallVec::new(),
            }),
            max_permits: permits,
        }
    }

    /// Returns the number of currently available permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.state.lock().permits
    }

    /// Returns the initial number of permits.
    #[must_use]
    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Returns true if the semaphore is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Closes the semaphore. Pending and future acquires fail.
    pub fn close(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }

    /// Waits for `count` permits.
    ///
    /// `count` is clamped to `1..=max_permits` so a request can always be
    /// satisfied eventually.
    pub fn acquire<'a>(&'a self, cx: &'a Cx, count: usize) -> Acquire<'a> {
        Acquire {
            semaphore: self,
            cx,
            count: self.clamp(count),
        }
    }

    /// Waits for `count` permits and returns a guard that owns a reference
    /// to the semaphore.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Cancelled`] if the caller is cancelled while
    /// waiting, or [`AcquireError::Closed`] if the semaphore closes.
    pub async fn acquire_owned(
        self: Arc<Self>,
        cx: &Cx,
        count: usize,
    ) -> Result<OwnedSemaphorePermit, AcquireError> {
        let permit = self.acquire(cx, count).await?;
        let count = permit.count;
        std::mem::forget(permit);
        Ok(OwnedSemaphorePermit {
            semaphore: self,
            count,
        })
    }

    /// Takes `count` permits if they are available right now.
    ///
    /// # Errors
    ///
    /// Returns [`TryAcquireError`] if the semaphore is closed or short.
    pub fn try_acquire(&self, count: usize) -> Result<SemaphorePermit<'_>, TryAcquireError> {
        let count = self.clamp(count);
        let mut state = self.state.lock();
        if state.closed || state.permits < count {
            return Err(TryAcquireError);
        }
        state.permits -= count;
        Ok(SemaphorePermit {
            semaphore: self,
            count,
        })
    }

    /// Adds permits back and wakes every waiter to re-check.
    pub fn add_permits(&self, count: usize) {
        let waiters = {
            let mut state = self.state.lock();
            state.permits += count;
            std::mem::take(&mut state.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }

    fn clamp(&self, count: usize) -> usize {
        count.clamp(1, self.max_permits.max(1))
    }

    fn poll_acquire(&self, cx: &Cx, count: usize, task_cx: &mut Context<'_>) -> Poll<Result<(), AcquireError>> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Poll::Ready(Err(AcquireError::Closed));
            }
            if state.permits >= count {
                state.permits -= count;
                return Poll::Ready(Ok(()));
            }
            if !state.waiters.iter().any(|w| w.will_wake(task_cx.waker())) {
                state.waiters.push(task_cx.waker().clone());
            }
        }
        cx.poll_cancel(task_cx).map(|reason| Err(AcquireError::Cancelled(reason)))
    }
}

/// Future returned by [`Semaphore::acquire`].
#[must_use = "futures do nothing unless awaited"]
pub struct Acquire<'a> {
    semaphore: &'a Semaphore,
    cx: &'a Cx,
    count: usize,
}

impl<'a> Future for Acquire<'a> {
    type Output = Result<SemaphorePermit<'a>, AcquireError>;

    fn poll(self: Pin<&mut Self>, task_cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(reason) = this.cx.pending_cancel() {
            return Poll::Ready(Err(AcquireError::Cancelled(reason)));
        }
        this.semaphore
            .poll_acquire(this.cx, this.count, task_cx)
            .map(|acquired| {
                acquired.map(|()| SemaphorePermit {
                    semaphore: this.semaphore,
                    count: this.count,
                })
            })
    }
}

/// A permit borrowed from a semaphore.
#[must_use = "permit will be immediately released if not held"]
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
    count: usize,
}

impl SemaphorePermit<'_> {
    /// Returns the number of permits held.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.add_permits(self.count);
    }
}

/// A permit that keeps its semaphore alive.
#[derive(Debug)]
#[must_use = "permit will be immediately released if not held"]
pub struct OwnedSemaphorePermit {
    semaphore: Arc<Semaphore>,
    count: usize,
}

impl OwnedSemaphorePermit {
    /// Returns the number of permits held.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Drop for OwnedSemaphorePermit {
    fn drop(&mut self) {
        self.semaphore.add_permits(self.count);
    }
}
