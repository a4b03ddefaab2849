//! The wrapper every fiber body runs inside.

use super::status::FiberStatus;
use crate::cx::Cx;
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, Exit};
use crate::util::catch_unwind::guarded_exit;
use std::future::{Future, poll_fn};

/// Runs a fiber body to its exit and closes its scope.
///
/// 1. The body runs with panics captured.
/// 2. Connected children still alive are cancelled with `ScopeClosed`.
/// 3. The wrapper waits until every child has finished.
/// 4. The signal is finalized and unlinked from its parent.
///
/// Only then is the exit returned, so a fiber never becomes terminal while
/// one of its descendants is still running.
pub(crate) async fn run_supervised<T, E, F, Fut>(cx: Cx, work: F) -> Exit<T, E>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Exit<T, E>>,
{
    let body_cx = cx.clone();
    let exit = guarded_exit(move || work(body_cx)).await;
    close_scope(&cx).await;
    cx.signal().finalize();
    trace!(
        task = %cx.task_id(),
        status = %FiberStatus::of_exit(&exit),
        "fiber finished"
    );
    exit
}

async fn close_scope(cx: &Cx) {
    let signal = cx.signal();
    let live = signal.live_children();
    if live > 0 {
        debug!(task = %cx.task_id(), live, "closing scope with live children");
        signal.cancel_children(&CancelReason::scope_closed());
    }
    poll_fn(|task_cx| signal.poll_quiescent(task_cx)).await;
}
