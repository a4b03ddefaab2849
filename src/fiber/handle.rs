//! Fiber handles and their exit slot.

use super::status::{FiberStatus, StatusCell};
use crate::cancel::CancelSignal;
use crate::cx::Cx;
use crate::types::{CancelReason, Cause, Exit, PanicPayload, TaskId};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// One-shot cell a fiber publishes its exit into.
pub(crate) struct ExitSlot<T, E> {
    state: Mutex<SlotState<T, E>>,
}

struct SlotState<T, E> {
    exit: Option<Exit<T, E>>,
    done: bool,
    waiters: SmallVec<[Waker; 1]>,
}

impl<T, E> ExitSlot<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                exit: None,
                done: false,
                waiters: SmallVec::new(),
            }),
        }
    }

    pub(crate) fn complete(&self, exit: Exit<T, E>) {
        let waiters = {
            let mut state = self.state.lock();
            state.exit = Some(exit);
            state.done = true;
            std::mem::take(&mut state.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Takes the exit once it is published.
    pub(crate) fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Exit<T, E>> {
        let mut state = self.state.lock();
        if state.done {
            // Every consumer stops polling after the first `Ready`.
            return Poll::Ready(state.exit.take().unwrap_or_else(|| {
                Err(Cause::Panicked(PanicPayload::new("fiber exit taken twice")))
            }));
        }
        if !state.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            state.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Handle to a running fiber.
///
/// Dropping the handle does not stop the fiber. A connected fiber is still
/// cancelled and drained when its parent finishes.
pub struct Fiber<T, E> {
    id: TaskId,
    signal: CancelSignal,
    status: Arc<StatusCell>,
    slot: Arc<ExitSlot<T, E>>,
}

impl<T, E> Fiber<T, E> {
    pub(crate) fn new(
        id: TaskId,
        signal: CancelSignal,
        status: Arc<StatusCell>,
        slot: Arc<ExitSlot<T, E>>,
    ) -> Self {
        Self {
            id,
            signal,
            status,
            slot,
        }
    }

    /// Returns the fiber's task id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the fiber's current status.
    #[must_use]
    pub fn status(&self) -> FiberStatus {
        self.status.get()
    }

    /// Returns true once the exit has been published.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.slot.is_done()
    }

    /// Requests cancellation without waiting. Idempotent.
    pub fn request_cancel(&self) -> bool {
        self.signal.request(CancelReason::user("fiber cancelled"))
    }

    /// Requests cancellation with a specific reason without waiting.
    pub fn request_cancel_with(&self, reason: CancelReason) -> bool {
        self.signal.request(reason)
    }

    /// Waits for the fiber's exit.
    ///
    /// A suspension point of the caller: if the caller is cancelled first,
    /// this returns `Cancelled` and the fiber keeps running.
    pub async fn join(self, cx: &Cx) -> Exit<T, E> {
        poll_fn(|task_cx| {
            if let Poll::Ready(exit) = self.poll_exit(task_cx) {
                return Poll::Ready(exit);
            }
            cx.poll_cancel(task_cx)
                .map(|reason| Err(Cause::Cancelled(reason)))
        })
        .await
    }

    /// Requests cancellation and waits until the fiber has fully unwound,
    /// finalizers and descendants included.
    ///
    /// Returns whatever the fiber finished with; a fiber that completed
    /// before observing the request still reports its value.
    pub async fn cancel(self) -> Exit<T, E> {
        self.cancel_with(CancelReason::user("fiber cancelled")).await
    }

    /// Like [`cancel`](Self::cancel) with a specific reason.
    pub async fn cancel_with(self, reason: CancelReason) -> Exit<T, E> {
        self.signal.request(reason);
        self.wait().await
    }

    /// Waits for the exit without observing the caller's cancellation.
    pub(crate) async fn wait(self) -> Exit<T, E> {
        poll_fn(|task_cx| self.poll_exit(task_cx)).await
    }

    pub(crate) fn poll_exit(&self, task_cx: &mut Context<'_>) -> Poll<Exit<T, E>> {
        self.slot.poll_take(task_cx)
    }

    pub(crate) fn signal(&self) -> &CancelSignal {
        &self.signal
    }
}

impl<T, E> fmt::Debug for Fiber<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("status", &self.status.get())
            .field("cancel", &self.signal.state())
            .finish()
    }
}
