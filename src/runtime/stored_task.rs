//! Type-erased futures owned by the executor.

use crate::tracing_compat::error;
use crate::types::PanicPayload;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

/// A boxed future with its output already routed elsewhere.
///
/// Fiber bodies publish their exit through the fiber's shared slot, so the
/// executor only needs `Future<Output = ()>`.
pub(crate) struct StoredTask {
    future: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl StoredTask {
    pub(crate) fn new<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// Polls the future once.
    ///
    /// A panic escaping the future completes the task instead of unwinding
    /// into the worker thread. Fiber bodies catch their own panics, so this
    /// only fires for raw submitted futures.
    pub(crate) fn poll(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        match catch_unwind(AssertUnwindSafe(|| self.future.as_mut().poll(cx))) {
            Ok(poll) => poll,
            Err(payload) => {
                let payload = PanicPayload::from_unwind(payload.as_ref());
                error!(panic = %payload, "submitted task panicked");
                Poll::Ready(())
            }
        }
    }
}

impl std::fmt::Debug for StoredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTask").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Wake, Waker};

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_waker() -> Waker {
        Waker::from(Arc::new(NoopWaker))
    }

    #[test]
    fn stored_task_polls_to_completion() {
        let completed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&completed);
        let mut task = StoredTask::new(async move {
            flag.store(true, Ordering::SeqCst);
        });
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(task.poll(&mut cx).is_ready());
        assert!(completed.load(Ordering::SeqCst));
    }

    #[test]
    fn panicking_future_completes_instead_of_unwinding() {
        let mut task = StoredTask::new(async {
            panic!("boom");
        });
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(task.poll(&mut cx).is_ready());
    }
}
