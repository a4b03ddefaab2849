//! Executor tasks.
//!
//! A [`Task`] owns one stored future and knows which context runs it. Its
//! waker re-enqueues the task on that context; the `scheduled` flag keeps a
//! task in the run queue at most once.

use super::context::ContextShared;
use super::stored_task::StoredTask;
use crate::fiber::{FiberStatus, StatusCell};
use crate::types::TaskId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};

pub(crate) struct Task {
    id: TaskId,
    future: Mutex<Option<StoredTask>>,
    scheduled: AtomicBool,
    status: Arc<StatusCell>,
    context: Arc<ContextShared>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        future: StoredTask,
        status: Arc<StatusCell>,
        context: Arc<ContextShared>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            future: Mutex::new(Some(future)),
            scheduled: AtomicBool::new(false),
            status,
            context,
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Queues the task unless it is already queued.
    ///
    /// Returns `false` if the context has shut down.
    pub(crate) fn schedule(self: &Arc<Self>) -> bool {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return true;
        }
        self.context.enqueue(Arc::clone(self))
    }

    /// Polls the future once on the current worker.
    pub(crate) fn run(self: Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);
        let waker = Waker::from(Arc::clone(&self));
        let mut cx = Context::from_waker(&waker);

        let mut slot = self.future.lock();
        let Some(stored) = slot.as_mut() else {
            return;
        };
        self.status.set_live(FiberStatus::Running);
        match stored.poll(&mut cx) {
            Poll::Ready(()) => *slot = None,
            Poll::Pending => self.status.set_live(FiberStatus::Suspended),
        }
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("scheduled", &self.scheduled.load(Ordering::Relaxed))
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}
