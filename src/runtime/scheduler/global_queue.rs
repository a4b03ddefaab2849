//! Shared run queue of an execution context.
//!
//! Every worker of a context pops from the same unbounded queue; wakers and
//! submitters push to it from any thread.

use crate::runtime::task::Task;
use crossbeam_queue::SegQueue;
use std::sync::Arc;

/// Lock-free queue of runnable tasks.
#[derive(Default)]
pub(crate) struct GlobalQueue {
    inner: SegQueue<Arc<Task>>,
}

impl GlobalQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    pub(crate) fn push(&self, task: Arc<Task>) {
        self.inner.push(task);
    }

    pub(crate) fn pop(&self) -> Option<Arc<Task>> {
        self.inner.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drops every queued task, returning how many were discarded.
    pub(crate) fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.inner.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

impl std::fmt::Debug for GlobalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalQueue")
            .field("len", &self.inner.len())
            .finish()
    }
}
