//! Waiting on several sibling fibers at once.
//!
//! Used by the parallel and racing combinators. Exits are reported in the
//! order they are observed; the caller's cancellation is reported as an
//! event of its own so the combinator can cancel and drain the group.

use super::handle::Fiber;
use crate::cx::Cx;
use crate::types::{CancelReason, Exit};
use std::future::poll_fn;
use std::task::Poll;

pub(crate) enum GroupEvent<T, E> {
    /// The fiber at this index finished.
    Exited(usize, Exit<T, E>),
    /// The caller was cancelled while waiting.
    Interrupted(CancelReason),
}

pub(crate) struct FiberGroup<T, E> {
    fibers: Vec<Option<Fiber<T, E>>>,
    live: usize,
}

impl<T, E> FiberGroup<T, E> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            fibers: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    pub(crate) fn push(&mut self, fiber: Fiber<T, E>) {
        self.fibers.push(Some(fiber));
        self.live += 1;
    }

    pub(crate) fn len(&self) -> usize {
        self.fibers.len()
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Waits for the next exit. Returns `None` once every fiber has exited.
    pub(crate) async fn next(&mut self, cx: &Cx) -> Option<GroupEvent<T, E>> {
        if self.live == 0 {
            return None;
        }
        poll_fn(|task_cx| {
            for (index, slot) in self.fibers.iter_mut().enumerate() {
                let Some(fiber) = slot else { continue };
                if let Poll::Ready(exit) = fiber.poll_exit(task_cx) {
                    *slot = None;
                    self.live -= 1;
                    return Poll::Ready(Some(GroupEvent::Exited(index, exit)));
                }
            }
            cx.poll_cancel(task_cx)
                .map(|reason| Some(GroupEvent::Interrupted(reason)))
        })
        .await
    }

    /// Requests cancellation of every live fiber and waits for all of them.
    ///
    /// The wait ignores the caller's own cancellation. Returns the drained
    /// exits with their indices.
    pub(crate) async fn cancel_and_drain(&mut self, reason: &CancelReason) -> Vec<(usize, Exit<T, E>)> {
        for fiber in self.fibers.iter().flatten() {
            fiber.signal().request(reason.clone());
        }
        let mut drained = Vec::with_capacity(self.live);
        for (index, slot) in self.fibers.iter_mut().enumerate() {
            if let Some(fiber) = slot.take() {
                drained.push((index, fiber.wait().await));
            }
        }
        self.live = 0;
        drained
    }
}
