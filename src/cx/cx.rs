//! The fiber capability context.
//!
//! A [`Cx`] is handed to every fiber body. It carries the fiber's
//! [`CancelSignal`], its mask depth and a handle to the runtime, and it is
//! the only way to observe cancellation: through [`Cx::checkpoint`], through
//! suspension points built on [`Cx::poll_cancel`], or by awaiting
//! [`Cx::cancelled`].
//!
//! # Masking
//!
//! While the mask depth is non-zero, checkpoints succeed even if a request is
//! pending and suspension points do not wake on cancellation. The request is
//! not lost: the first checkpoint after the outermost mask ends observes it.

use crate::cancel::CancelSignal;
use crate::runtime::RuntimeHandle;
use crate::types::{CancelReason, Cancelled, TaskId};
use std::fmt;
use std::future::{Future, poll_fn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::task::{Context, Poll};

/// Capability context for a running fiber.
#[derive(Clone)]
pub struct Cx {
    inner: Arc<CxInner>,
}

struct CxInner {
    task: TaskId,
    signal: CancelSignal,
    mask_depth: AtomicU32,
    checkpoints: AtomicU64,
    runtime: RuntimeHandle,
}

impl Cx {
    pub(crate) fn new(task: TaskId, signal: CancelSignal, runtime: RuntimeHandle) -> Self {
        Self {
            inner: Arc::new(CxInner {
                task,
                signal,
                mask_depth: AtomicU32::new(0),
                checkpoints: AtomicU64::new(0),
                runtime,
            }),
        }
    }

    /// Returns the id of the fiber this context belongs to.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.inner.task
    }

    /// Returns the fiber's cancellation signal.
    #[must_use]
    pub fn signal(&self) -> &CancelSignal {
        &self.inner.signal
    }

    /// Returns the runtime this fiber runs on.
    #[must_use]
    pub fn runtime(&self) -> &RuntimeHandle {
        &self.inner.runtime
    }

    /// Returns true if cancellation has been requested, masked or not.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.signal.is_cancel_requested()
    }

    /// Returns the pending cancellation reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.inner.signal.reason()
    }

    /// Returns true inside an uncancellable section.
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.inner.mask_depth.load(Ordering::Acquire) > 0
    }

    /// Number of checkpoints this fiber has passed.
    #[must_use]
    pub fn checkpoint_count(&self) -> u64 {
        self.inner.checkpoints.load(Ordering::Relaxed)
    }

    /// Observes pending cancellation.
    ///
    /// If the context is masked this returns `Ok(())` even when a request is
    /// pending, deferring it until the mask is released.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if cancellation is pending and the context is
    /// not masked.
    ///
    /// ```ignore
    /// async fn copy_all(cx: &Cx, chunks: &[Chunk]) -> Exit<(), IoError> {
    ///     for chunk in chunks {
    ///         cx.checkpoint()?;
    ///         write(chunk).await?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        self.inner.checkpoints.fetch_add(1, Ordering::Relaxed);
        match self.pending_cancel() {
            Some(reason) => Err(Cancelled::new(reason)),
            None => Ok(()),
        }
    }

    /// Returns the reason of a pending, unmasked request.
    pub(crate) fn pending_cancel(&self) -> Option<CancelReason> {
        if self.is_masked() {
            return None;
        }
        self.inner.signal.reason()
    }

    /// Poll-level cancellation hook for suspension points.
    ///
    /// Registers the task's waker with the signal so that a later request
    /// wakes the suspended primitive. Masked contexts never become ready and
    /// register nothing.
    pub fn poll_cancel(&self, task_cx: &mut Context<'_>) -> Poll<CancelReason> {
        if self.is_masked() {
            return Poll::Pending;
        }
        if !self.inner.signal.register_waker(task_cx.waker()) {
            if let Some(reason) = self.inner.signal.reason() {
                return Poll::Ready(reason);
            }
        }
        Poll::Pending
    }

    /// Suspends until cancellation is requested and unmasked.
    pub async fn cancelled(&self) -> CancelReason {
        poll_fn(|task_cx| self.poll_cancel(task_cx)).await
    }

    /// Runs `fut` with cancellation masked.
    ///
    /// The entry is a checkpoint: if a request is already pending the future
    /// is never polled. Once entered, the future runs to completion; a
    /// request that arrives meanwhile is observed by the next checkpoint
    /// after the section ends.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if cancellation was pending on entry.
    pub async fn uncancellable<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        self.checkpoint()?;
        Ok(self.masked(fut).await)
    }

    /// Runs `fut` with cancellation masked, without an entry checkpoint.
    ///
    /// Used for finalizers, which must run even when the fiber is already
    /// cancelled.
    pub(crate) async fn masked<F: Future>(&self, fut: F) -> F::Output {
        let _guard = self.mask();
        fut.await
    }

    pub(crate) fn mask(&self) -> MaskGuard {
        self.inner.mask_depth.fetch_add(1, Ordering::AcqRel);
        MaskGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Creates the context of a forked fiber.
    pub(crate) fn for_child(&self, task: TaskId, signal: CancelSignal) -> Self {
        Self::new(task, signal, self.inner.runtime.clone())
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("task", &self.inner.task)
            .field("signal", &self.inner.signal)
            .field("mask_depth", &self.inner.mask_depth.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Guard that restores the mask depth on drop.
pub(crate) struct MaskGuard {
    inner: Arc<CxInner>,
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        self.inner.mask_depth.fetch_sub(1, Ordering::AcqRel);
    }
}
