//! Worker loop.

use crate::runtime::context::ContextShared;
use crate::tracing_compat::trace;

/// Drains the context's queue until shutdown, parking when it is empty.
pub(crate) fn run_worker(shared: &ContextShared) {
    shared.enter();
    trace!(context = %shared.id(), "worker started");
    loop {
        if shared.is_shutdown() {
            break;
        }
        match shared.queue().pop() {
            Some(task) => {
                trace!(task = %task.id(), "polling task");
                task.run();
            }
            None => shared.park(),
        }
    }
    trace!(context = %shared.id(), "worker stopped");
}
