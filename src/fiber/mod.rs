//! Fibers: lightweight concurrent tasks with structured cancellation.
//!
//! A fiber is a future running on an [`ExecutionContext`] together with its
//! own [`CancelSignal`]. How that signal is linked decides who can cancel it:
//!
//! | Fork | Signal | Cancelled by |
//! |------|--------|--------------|
//! | [`fork_connected`] | child of the caller's | the caller's cancellation, the caller's scope closing, the handle |
//! | [`fork_scoped`] | child of a [`CancelTrigger`] | the trigger, the handle |
//! | [`fork_and_forget`] | root | the handle only |
//!
//! Every fiber closes its own scope before it publishes an exit: connected
//! children still running are cancelled with `ScopeClosed` and awaited. A
//! terminal fiber therefore has no live descendants, and
//! [`Fiber::cancel`] returning means the whole subtree has unwound.
//!
//! Failures of a forked fiber reach the parent only through
//! [`Fiber::join`]. Dropping a handle never surfaces them.

mod group;
mod handle;
mod status;
mod supervise;

pub use handle::Fiber;
pub use status::FiberStatus;

pub(crate) use group::{FiberGroup, GroupEvent};
pub(crate) use handle::ExitSlot;
pub(crate) use status::StatusCell;
pub(crate) use supervise::run_supervised;

use crate::cancel::{CancelSignal, CancelTrigger};
use crate::cx::Cx;
use crate::runtime::{ExecutionContext, RuntimeHandle};
use crate::tracing_compat::trace;
use crate::types::{CancelReason, Cause, Exit, TaskId};
use crate::util::catch_unwind::guarded_exit;
use std::future::{Future, poll_fn};
use std::sync::Arc;

/// Starts `work` as a fiber whose signal is a child of the caller's.
///
/// Cancelling the caller cancels the fiber. When the caller's body returns
/// while the fiber still runs, the fiber is cancelled and awaited before the
/// caller finishes.
pub fn fork_connected<T, E, F, Fut>(cx: &Cx, ctx: &ExecutionContext, work: F) -> Fiber<T, E>
where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Exit<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let signal = CancelSignal::child_of(cx.signal());
    spawn_fiber(cx.runtime(), ctx, signal, work)
}

/// Starts `work` as a fiber cancelled by an external `trigger` rather than
/// by the caller.
pub fn fork_scoped<T, E, F, Fut>(
    cx: &Cx,
    ctx: &ExecutionContext,
    trigger: &CancelTrigger,
    work: F,
) -> Fiber<T, E>
where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Exit<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let signal = CancelSignal::child_of(trigger.signal());
    spawn_fiber(cx.runtime(), ctx, signal, work)
}

/// Starts `work` as a fiber with no cancellation linkage at all.
///
/// Only the returned handle can cancel it, and it outlives the caller.
pub fn fork_and_forget<T, E, F, Fut>(cx: &Cx, ctx: &ExecutionContext, work: F) -> Fiber<T, E>
where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Exit<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    spawn_fiber(cx.runtime(), ctx, CancelSignal::root(), work)
}

/// Runs `work` on `ctx` as part of the calling fiber and waits for it.
///
/// The work sees the caller's `Cx`: the same signal, the same mask depth,
/// the same checkpoints. The wait itself cannot be interrupted, so control
/// only returns once the work has finished on `ctx`; a cancellation request
/// made meanwhile is observed by the work at its own checkpoints.
///
/// Entry is a checkpoint.
pub async fn eval_on<T, E, F, Fut>(cx: &Cx, ctx: &ExecutionContext, work: F) -> Exit<T, E>
where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Exit<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    cx.checkpoint()?;
    let slot = Arc::new(ExitSlot::new());
    let publish = Arc::clone(&slot);
    let work_cx = cx.clone();
    let submitted = ctx.submit(async move {
        let exit = guarded_exit(move || work(work_cx)).await;
        publish.complete(exit);
    });
    if let Err(err) = submitted {
        trace!(context = %ctx.id(), error = %err, "eval_on target unavailable");
        return Err(Cause::Cancelled(CancelReason::shutdown()));
    }
    poll_fn(|task_cx| slot.poll_take(task_cx)).await
}

/// Spawns a supervised fiber body onto `ctx` with the given signal.
pub(crate) fn spawn_fiber<T, E, F, Fut>(
    runtime: &RuntimeHandle,
    ctx: &ExecutionContext,
    signal: CancelSignal,
    work: F,
) -> Fiber<T, E>
where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Exit<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let id = TaskId::next();
    let status = Arc::new(StatusCell::new());
    let slot = Arc::new(ExitSlot::new());
    let cx = Cx::new(id, signal.clone(), runtime.clone());
    let publisher = Publisher {
        slot: Arc::clone(&slot),
        status: Arc::clone(&status),
        signal: signal.clone(),
        published: false,
    };

    trace!(task = %id, context = %ctx.id(), "fiber forked");
    let body = async move {
        let mut publisher = publisher;
        let exit = run_supervised(cx, work).await;
        publisher.publish(exit);
    };
    if let Err(err) = ctx.spawn_task(id, Arc::clone(&status), body) {
        // The rejected body was dropped, so its publisher already reported
        // the shutdown.
        trace!(task = %id, error = %err, "fiber rejected by context");
    }
    Fiber::new(id, signal, status, slot)
}

/// Publishes a fiber's exit exactly once.
///
/// If the body is dropped before finishing, which happens when its context
/// shuts down, the drop publishes a `Shutdown` cancellation so joiners never
/// hang.
struct Publisher<T, E> {
    slot: Arc<ExitSlot<T, E>>,
    status: Arc<StatusCell>,
    signal: CancelSignal,
    published: bool,
}

impl<T, E> Publisher<T, E> {
    fn publish(&mut self, exit: Exit<T, E>) {
        self.published = true;
        self.status.finish(FiberStatus::of_exit(&exit));
        self.slot.complete(exit);
    }
}

impl<T, E> Drop for Publisher<T, E> {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let reason = CancelReason::shutdown();
        self.signal.request(reason.clone());
        self.signal.finalize();
        self.publish(Err(Cause::Cancelled(reason)));
    }
}
