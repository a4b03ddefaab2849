//! Runtime construction and the root entry points.
//!
//! ```ignore
//! let runtime = RuntimeBuilder::new().compute_threads(4).build()?;
//! let exit = runtime.block_on(|cx| async move {
//!     let compute = cx.runtime().compute().clone();
//!     par_map2(&cx, &compute, |_| async { Ok(1) }, |_| async { Ok(2) }, |a, b| a + b).await
//! });
//! ```

use super::config::RuntimeConfig;
use super::context::{ContextKind, ExecutionContext};
use super::timer::TimerDriver;
use crate::cancel::CancelSignal;
use crate::cx::Cx;
use crate::error::{Error, ErrorKind};
use crate::fiber::{Fiber, run_supervised, spawn_fiber};
use crate::tracing_compat::info;
use crate::types::{Exit, TaskId};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::Thread;

/// Builder for [`Runtime`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// Starts from an existing configuration.
    #[must_use]
    pub fn from_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if the file cannot be used.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        RuntimeConfig::from_toml_file(path).map(Self::from_config)
    }

    /// Set the number of compute workers.
    #[must_use]
    pub fn compute_threads(mut self, n: usize) -> Self {
        self.config.compute_threads = n;
        self
    }

    /// Set the number of blocking workers.
    #[must_use]
    pub fn blocking_threads(mut self, n: usize) -> Self {
        self.config.blocking_threads = n;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.config.thread_stack_size = size;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set the timer thread name.
    #[must_use]
    pub fn timer_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.timer_thread_name = name.into();
        self
    }

    /// Smallest useful runtime: one compute and one blocking worker.
    #[must_use]
    pub fn current_thread() -> Self {
        Self::new().compute_threads(1).blocking_threads(1)
    }

    /// Multi-threaded runtime with defaults.
    #[must_use]
    pub fn multi_thread() -> Self {
        Self::new()
    }

    /// Returns the configuration as it will be used.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Starts the timer thread and the three standard contexts.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ThreadSpawn`] if any thread fails to start.
    pub fn build(self) -> Result<Runtime, Error> {
        Runtime::with_config(self.config)
    }
}

/// An owned runtime. Dropping it shuts every context down.
pub struct Runtime {
    handle: RuntimeHandle,
}

/// Cloneable access to a runtime, reachable from any fiber via
/// [`Cx::runtime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeShared>,
}

struct RuntimeShared {
    config: RuntimeConfig,
    timer: TimerDriver,
    compute: ExecutionContext,
    blocking: ExecutionContext,
    single: ExecutionContext,
    custom: Mutex<Vec<ExecutionContext>>,
    shutdown: AtomicBool,
}

impl Runtime {
    /// Builds a runtime from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ThreadSpawn`] if any thread fails to start.
    pub fn with_config(mut config: RuntimeConfig) -> Result<Self, Error> {
        config.normalize();
        let stack = config.thread_stack_size;
        let prefix = config.thread_name_prefix.clone();

        let timer = TimerDriver::start(&config.timer_thread_name)?;
        let compute = ExecutionContext::start(
            &format!("{prefix}-compute"),
            ContextKind::Compute,
            config.compute_threads,
            stack,
        )?;
        let blocking = match ExecutionContext::start(
            &format!("{prefix}-blocking"),
            ContextKind::Blocking,
            config.blocking_threads,
            stack,
        ) {
            Ok(ctx) => ctx,
            Err(err) => {
                compute.shutdown();
                return Err(err);
            }
        };
        let single = match ExecutionContext::start(
            &format!("{prefix}-single"),
            ContextKind::Single,
            1,
            stack,
        ) {
            Ok(ctx) => ctx,
            Err(err) => {
                compute.shutdown();
                blocking.shutdown();
                return Err(err);
            }
        };

        info!(
            compute = config.compute_threads,
            blocking = config.blocking_threads,
            "runtime started"
        );
        Ok(Self {
            handle: RuntimeHandle {
                inner: Arc::new(RuntimeShared {
                    config,
                    timer,
                    compute,
                    blocking,
                    single,
                    custom: Mutex::new(Vec::new()),
                    shutdown: AtomicBool::new(false),
                }),
            },
        })
    }

    /// Returns a cloneable handle.
    #[must_use]
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// The compute context.
    #[must_use]
    pub fn compute(&self) -> &ExecutionContext {
        self.handle.compute()
    }

    /// The blocking context.
    #[must_use]
    pub fn blocking(&self) -> &ExecutionContext {
        self.handle.blocking()
    }

    /// The single-thread context.
    #[must_use]
    pub fn single(&self) -> &ExecutionContext {
        self.handle.single()
    }

    /// Creates an extra context owned by this runtime.
    ///
    /// # Errors
    ///
    /// See [`RuntimeHandle::new_context`].
    pub fn new_context(&self, name: &str, threads: usize) -> Result<ExecutionContext, Error> {
        self.handle.new_context(name, threads)
    }

    /// Runs a root fiber on the calling thread and returns its exit.
    ///
    /// The root fiber has its own signal with no parent. Its connected
    /// children are cancelled and drained before this returns.
    ///
    /// Must not be called from a worker thread: the worker would stop
    /// draining its queue while it waits.
    pub fn block_on<T, E, F, Fut>(&self, work: F) -> Exit<T, E>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Exit<T, E>>,
    {
        let cx = Cx::new(TaskId::next(), CancelSignal::root(), self.handle.clone());
        park_on(run_supervised(cx, work))
    }

    /// Starts a detached root fiber on `ctx`.
    pub fn spawn<T, E, F, Fut>(&self, ctx: &ExecutionContext, work: F) -> Fiber<T, E>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Exit<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.handle.spawn(ctx, work)
    }

    /// Shuts every context and the timer down.
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.handle.inner.config)
            .finish_non_exhaustive()
    }
}

impl RuntimeHandle {
    /// The compute context.
    #[must_use]
    pub fn compute(&self) -> &ExecutionContext {
        &self.inner.compute
    }

    /// The blocking context.
    #[must_use]
    pub fn blocking(&self) -> &ExecutionContext {
        &self.inner.blocking
    }

    /// The single-thread context.
    #[must_use]
    pub fn single(&self) -> &ExecutionContext {
        &self.inner.single
    }

    /// The configuration the runtime was built with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Returns true once the runtime has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn timer(&self) -> &TimerDriver {
        &self.inner.timer
    }

    /// Creates an extra context owned by this runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::RuntimeShutdown`] after shutdown, or
    /// [`ErrorKind::ThreadSpawn`] if a worker fails to start.
    pub fn new_context(&self, name: &str, threads: usize) -> Result<ExecutionContext, Error> {
        if self.is_shutdown() {
            return Err(Error::new(ErrorKind::RuntimeShutdown).with_message(name.to_owned()));
        }
        let full_name = format!("{}-{name}", self.inner.config.thread_name_prefix);
        let ctx = ExecutionContext::start(
            &full_name,
            ContextKind::Custom,
            threads,
            self.inner.config.thread_stack_size,
        )?;
        self.inner.custom.lock().push(ctx.clone());
        Ok(ctx)
    }

    /// Starts a detached root fiber on `ctx`.
    pub fn spawn<T, E, F, Fut>(&self, ctx: &ExecutionContext, work: F) -> Fiber<T, E>
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Exit<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        spawn_fiber(self, ctx, CancelSignal::root(), work)
    }

    /// Shuts every context and the timer down. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let custom = std::mem::take(&mut *self.inner.custom.lock());
        for ctx in custom {
            ctx.shutdown();
        }
        self.inner.compute.shutdown();
        self.inner.blocking.shutdown();
        self.inner.single.shutdown();
        self.inner.timer.shutdown();
        info!("runtime shut down");
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

/// Waker that unparks the thread blocked in [`park_on`].
struct ThreadWaker {
    thread: Thread,
    notified: AtomicBool,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notified.store(true, Ordering::Release);
        self.thread.unpark();
    }
}

fn park_on<F: Future>(future: F) -> F::Output {
    let mut future = std::pin::pin!(future);
    let parker = Arc::new(ThreadWaker {
        thread: std::thread::current(),
        notified: AtomicBool::new(false),
    });
    let waker = Waker::from(Arc::clone(&parker));
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        while !parker.notified.swap(false, Ordering::AcqRel) {
            std::thread::park();
        }
    }
}
