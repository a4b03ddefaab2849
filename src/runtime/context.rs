//! Execution contexts.
//!
//! An [`ExecutionContext`] is a named pool of worker threads draining one
//! shared run queue. The runtime starts three of them (compute, blocking and
//! single) and callers may create more. Submission always enqueues; work
//! never runs inline on the submitting thread.

use super::scheduler::{GlobalQueue, run_worker};
use super::stored_task::StoredTask;
use super::task::Task;
use crate::error::{Error, ErrorKind};
use crate::fiber::StatusCell;
use crate::tracing_compat::{debug, trace};
use crate::types::{ContextId, TaskId};
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<ContextId>> = const { Cell::new(None) };
}

/// What a context is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// CPU-bound work, one worker per core by default.
    Compute,
    /// Work that may block its thread.
    Blocking,
    /// A single worker, for work that must not run in parallel with itself.
    Single,
    /// Created by the caller.
    Custom,
}

/// Queue and parking state shared by a context's workers and its tasks.
pub(crate) struct ContextShared {
    id: ContextId,
    queue: GlobalQueue,
    park: Mutex<()>,
    unpark: Condvar,
    shutdown: AtomicBool,
}

impl ContextShared {
    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn queue(&self) -> &GlobalQueue {
        &self.queue
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Pushes a runnable task and wakes one parked worker.
    pub(crate) fn enqueue(&self, task: Arc<Task>) -> bool {
        if self.is_shutdown() {
            return false;
        }
        self.queue.push(task);
        let _guard = self.park.lock();
        self.unpark.notify_one();
        true
    }

    /// Parks the calling worker until work arrives or the context shuts down.
    pub(crate) fn park(&self) {
        let mut guard = self.park.lock();
        if !self.queue.is_empty() || self.is_shutdown() {
            return;
        }
        self.unpark.wait(&mut guard);
    }

    fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _guard = self.park.lock();
        self.unpark.notify_all();
    }

    pub(crate) fn enter(&self) {
        CURRENT_CONTEXT.with(|current| current.set(Some(self.id)));
    }
}

/// A named pool of worker threads.
///
/// Cloning returns another handle to the same pool.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    shared: Arc<ContextShared>,
    name: String,
    kind: ContextKind,
    threads: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutionContext {
    /// Starts a context with `threads` workers.
    pub(crate) fn start(
        name: &str,
        kind: ContextKind,
        threads: usize,
        stack_size: usize,
    ) -> Result<Self, Error> {
        let threads = threads.max(1);
        let shared = Arc::new(ContextShared {
            id: ContextId::next(),
            queue: GlobalQueue::new(),
            park: Mutex::new(()),
            unpark: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker_shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("{name}-{index}"))
                .stack_size(stack_size)
                .spawn(move || run_worker(&worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    shared.begin_shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(Error::new(ErrorKind::ThreadSpawn)
                        .with_message(format!("{name} worker {index}"))
                        .with_source(err));
                }
            }
        }

        debug!(context = %shared.id, name, threads, "execution context started");
        Ok(Self {
            inner: Arc::new(ContextInner {
                shared,
                name: name.to_owned(),
                kind,
                threads,
                workers: Mutex::new(workers),
            }),
        })
    }

    /// Returns the context id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.inner.shared.id
    }

    /// Returns the context name (also the worker thread name prefix).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns what the context is meant for.
    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.inner.kind
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.inner.threads
    }

    /// Number of tasks waiting to be polled.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.shared.queue.len()
    }

    /// Returns true if the calling thread is one of this context's workers.
    #[must_use]
    pub fn is_current(&self) -> bool {
        Self::current_id() == Some(self.id())
    }

    /// Returns the context of the calling worker thread, if any.
    #[must_use]
    pub fn current_id() -> Option<ContextId> {
        CURRENT_CONTEXT.with(Cell::get)
    }

    /// Returns true once the context has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shared.is_shutdown()
    }

    /// Submits a detached future.
    ///
    /// The future is always enqueued, even when called from one of this
    /// context's own workers.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ContextShutdown`] if the context has shut down.
    pub fn submit<F>(&self, future: F) -> Result<TaskId, Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = TaskId::next();
        self.spawn_task(id, Arc::new(StatusCell::new()), future)?;
        Ok(id)
    }

    pub(crate) fn spawn_task<F>(
        &self,
        id: TaskId,
        status: Arc<StatusCell>,
        future: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = Task::new(
            id,
            StoredTask::new(future),
            status,
            Arc::clone(&self.inner.shared),
        );
        if task.schedule() {
            trace!(task = %id, context = %self.id(), "task submitted");
            Ok(())
        } else {
            Err(Error::new(ErrorKind::ContextShutdown).with_message(self.inner.name.clone()))
        }
    }

    /// Stops the workers and drops every queued task.
    ///
    /// Idempotent. Workers finish the poll they are in, then exit.
    pub fn shutdown(&self) {
        if self.inner.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shared.begin_shutdown();
        let workers = std::mem::take(&mut *self.inner.workers.lock());
        let current = std::thread::current().id();
        for handle in workers {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        let dropped = self.inner.shared.queue.drain();
        debug!(context = %self.id(), dropped, "execution context shut down");
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id())
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("threads", &self.inner.threads)
            .finish()
    }
}
