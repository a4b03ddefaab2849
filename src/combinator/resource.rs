//! Composable resources.
//!
//! A [`Resource`] is a recipe: nothing is acquired until it is used.
//! Composing resources with [`Resource::and_then`] or [`Resource::zip`]
//! builds a chain whose releases run in strict reverse order of
//! acquisition, each one uncancellable, each one attempted even if an
//! earlier release failed.
//!
//! Every acquire step is uncancellable. Between steps the chain is a
//! checkpoint: a request observed there releases whatever was already
//! acquired and ends the chain with `Cancelled`.

use super::bracket::{combine_release, exit_case_of, settle};
use crate::cx::Cx;
use crate::tracing_compat::{debug, warn};
use crate::types::{Cause, Exit, ExitCase};
use crate::util::BoxFuture;
use crate::util::catch_unwind::{guarded, guarded_exit};
use std::fmt;
use std::future::Future;

type Release<E> = Box<dyn FnOnce(ExitCase<(), E>) -> BoxFuture<'static, Result<(), E>> + Send>;
type Acquire<R, E> = Box<dyn FnOnce(Cx) -> BoxFuture<'static, Exit<(R, ReleaseStack<E>), E>> + Send>;

/// The releases owed by an acquired resource, most recent last.
pub struct ReleaseStack<E> {
    steps: Vec<Release<E>>,
}

impl<E> ReleaseStack<E>
where
    E: Clone + Send + 'static,
{
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn push(&mut self, step: Release<E>) {
        self.steps.push(step);
    }

    fn append(&mut self, mut later: Self) {
        self.steps.append(&mut later.steps);
    }

    /// Number of pending releases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if nothing is owed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every release in reverse acquisition order with `case`.
    ///
    /// Runs masked. A failing or panicking release does not stop the ones
    /// before it; all failures are composed in the order they happened.
    ///
    /// # Errors
    ///
    /// Returns the composed release failures.
    pub async fn release(mut self, cx: &Cx, case: ExitCase<(), E>) -> Result<(), Cause<E>> {
        let _mask = cx.mask();
        let mut failure: Option<Cause<E>> = None;
        while let Some(step) = self.steps.pop() {
            let case = case.clone();
            let outcome = guarded(move || step(case))
                .await
                .map_err(Cause::Panicked)
                .and_then(|released| released.map_err(Cause::Failure));
            if let Err(cause) = outcome {
                debug!(task = %cx.task_id(), remaining = self.steps.len(), "resource release failed");
                failure = Some(match failure {
                    Some(prev) => prev.compose(cause),
                    None => cause,
                });
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

impl<E> fmt::Debug for ReleaseStack<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseStack")
            .field("pending", &self.steps.len())
            .finish()
    }
}

fn boxed<R, E, F, Fut>(acquire: F) -> Acquire<R, E>
where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Exit<(R, ReleaseStack<E>), E>> + Send + 'static,
{
    Box::new(move |cx| -> BoxFuture<'static, _> { Box::pin(acquire(cx)) })
}

/// Releases `stack` after a failure and folds release failures into `cause`.
async fn release_after<E>(cx: &Cx, stack: ReleaseStack<E>, cause: Cause<E>) -> Cause<E>
where
    E: Clone + Send + 'static,
{
    match stack.release(cx, ExitCase::from_cause(cause.clone())).await {
        Ok(()) => cause,
        Err(release_cause) => {
            warn!(task = %cx.task_id(), "release failed while unwinding a resource chain");
            cause.compose(release_cause)
        }
    }
}

/// A resource description: how to acquire a value and how to release it.
pub struct Resource<R, E> {
    acquire: Acquire<R, E>,
}

impl<R, E> Resource<R, E>
where
    R: Send + 'static,
    E: Clone + Send + 'static,
{
    /// A resource acquired by `acquire` and released by `release`.
    ///
    /// The release receives its own copy of the value and the way the
    /// enclosing use ended.
    pub fn new<A, AF, Rel, RelF>(acquire: A, release: Rel) -> Self
    where
        R: Clone,
        A: FnOnce(Cx) -> AF + Send + 'static,
        AF: Future<Output = Exit<R, E>> + Send + 'static,
        Rel: FnOnce(R, ExitCase<(), E>) -> RelF + Send + 'static,
        RelF: Future<Output = Result<(), E>> + Send + 'static,
    {
        Self {
            acquire: boxed(move |cx: Cx| async move {
                let body_cx = cx.clone();
                let value = cx
                    .uncancellable(guarded_exit(move || acquire(body_cx)))
                    .await??;
                let held = value.clone();
                let mut stack = ReleaseStack::new();
                stack.push(Box::new(move |case| -> BoxFuture<'static, Result<(), E>> {
                    Box::pin(release(held, case))
                }));
                Ok((value, stack))
            }),
        }
    }

    /// A value that needs no release.
    pub fn pure(value: R) -> Self {
        Self {
            acquire: boxed(move |_cx: Cx| async move { Ok((value, ReleaseStack::new())) }),
        }
    }

    /// Transforms the acquired value.
    ///
    /// A panic in `f` releases what was acquired.
    pub fn map<R2, F>(self, f: F) -> Resource<R2, E>
    where
        R2: Send + 'static,
        F: FnOnce(R) -> R2 + Send + 'static,
    {
        Resource {
            acquire: boxed(move |cx: Cx| async move {
                let (value, stack) = (self.acquire)(cx.clone()).await?;
                let mapped: Exit<R2, E> = guarded(move || {
                    let mapped = f(value);
                    async move { mapped }
                })
                .await
                .map_err(Cause::Panicked);
                match mapped {
                    Ok(mapped) => Ok((mapped, stack)),
                    Err(cause) => Err(release_after(&cx, stack, cause).await),
                }
            }),
        }
    }

    /// Acquires this resource, then the one `f` builds from its value.
    ///
    /// If the second acquisition fails, is cancelled or panics, the first
    /// resource is released before the chain fails.
    pub fn and_then<R2, F>(self, f: F) -> Resource<R2, E>
    where
        R2: Send + 'static,
        F: FnOnce(R) -> Resource<R2, E> + Send + 'static,
    {
        Resource {
            acquire: boxed(move |cx: Cx| async move {
                let (value, mut stack) = (self.acquire)(cx.clone()).await?;
                let next_cx = cx.clone();
                let next = guarded_exit(move || {
                    let next = f(value);
                    async move {
                        next_cx.checkpoint()?;
                        (next.acquire)(next_cx).await
                    }
                })
                .await;
                match next {
                    Ok((value, later)) => {
                        stack.append(later);
                        Ok((value, stack))
                    }
                    Err(cause) => Err(release_after(&cx, stack, cause).await),
                }
            }),
        }
    }

    /// Acquires both resources, this one first.
    pub fn zip<R2>(self, other: Resource<R2, E>) -> Resource<(R, R2), E>
    where
        R2: Send + 'static,
    {
        self.and_then(move |first| other.map(move |second| (first, second)))
    }

    /// Acquires the resource, runs `f` with it, and releases it.
    pub async fn use_with<T, F, Fut>(self, cx: &Cx, f: F) -> Exit<T, E>
    where
        F: FnOnce(R) -> Fut,
        Fut: Future<Output = Exit<T, E>>,
    {
        let (value, stack) = (self.acquire)(cx.clone()).await?;
        let exit = settle(cx, guarded_exit(move || f(value)).await);
        let released = stack.release(cx, exit_case_of(&exit)).await;
        combine_release(cx, exit, released)
    }

    /// Acquires the resource and hands back the value with its releases.
    ///
    /// The caller owns the returned [`ReleaseStack`] and must run it.
    pub async fn allocate(self, cx: &Cx) -> Exit<(R, ReleaseStack<E>), E> {
        (self.acquire)(cx.clone()).await
    }
}

impl<R, E> fmt::Debug for Resource<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, run_test};
    use crate::types::CancelReason;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn tracked(log: &Log, name: &'static str) -> Resource<&'static str, String> {
        let acquired = Arc::clone(log);
        let released = Arc::clone(log);
        Resource::new(
            move |_cx| async move {
                acquired.lock().push(format!("acquire {name}"));
                Ok(name)
            },
            move |value, case| async move {
                released
                    .lock()
                    .push(format!("release {value} completed={}", case.is_completed()));
                Ok(())
            },
        )
    }

    fn failing_release(log: &Log, name: &'static str) -> Resource<&'static str, String> {
        let released = Arc::clone(log);
        Resource::new(
            move |_cx| async move { Ok(name) },
            move |value, _case| async move {
                released.lock().push(format!("release {value}"));
                Err(format!("{value} release failed"))
            },
        )
    }

    #[test]
    fn chain_releases_in_reverse() {
        init_test("chain_releases_in_reverse");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let chain = tracked(&log, "a")
            .zip(tracked(&log, "b"))
            .zip(tracked(&log, "c"));
        let exit: Exit<String, String> = run_test(|cx| async move {
            chain
                .use_with(&cx, |((a, b), c)| async move { Ok(format!("{a}{b}{c}")) })
                .await
        });
        crate::assert_exit_ok!(exit, "abc".to_string());
        let events = log.lock().clone();
        let expected = vec![
            "acquire a",
            "acquire b",
            "acquire c",
            "release c completed=true",
            "release b completed=true",
            "release a completed=true",
        ];
        crate::assert_with_log!(events == expected, "order", expected, events);
        crate::test_complete!("chain_releases_in_reverse");
    }

    #[test]
    fn failed_acquire_releases_prefix() {
        init_test("failed_acquire_releases_prefix");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let broken: Resource<&'static str, String> = Resource::new(
            |_cx| async { Err(Cause::Failure("no c".to_string())) },
            |_value, _case| async { Ok(()) },
        );
        let chain = tracked(&log, "a").zip(tracked(&log, "b")).zip(broken);
        let used = Arc::new(Mutex::new(false));
        let used_flag = Arc::clone(&used);
        let exit: Exit<(), String> = run_test(|cx| async move {
            chain
                .use_with(&cx, move |_| async move {
                    *used_flag.lock() = true;
                    Ok(())
                })
                .await
        });
        crate::assert_exit_failure!(exit, "no c".to_string());
        crate::assert_with_log!(!*used.lock(), "use skipped", false, *used.lock());
        let events = log.lock().clone();
        let expected = vec![
            "acquire a",
            "acquire b",
            "release b completed=false",
            "release a completed=false",
        ];
        crate::assert_with_log!(events == expected, "prefix released", expected, events);
        crate::test_complete!("failed_acquire_releases_prefix");
    }

    #[test]
    fn every_release_runs_when_some_fail() {
        init_test("every_release_runs_when_some_fail");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let chain = failing_release(&log, "a")
            .zip(tracked(&log, "b"))
            .zip(failing_release(&log, "c"));
        let exit: Exit<(), String> = run_test(|cx| async move {
            chain
                .use_with(&cx, |_| async { Err(Cause::Failure("use failed".to_string())) })
                .await
        });
        let expected = Cause::Composite(vec![
            Cause::Failure("use failed".to_string()),
            Cause::Failure("c release failed".to_string()),
            Cause::Failure("a release failed".to_string()),
        ]);
        crate::assert_with_log!(exit == Err(expected.clone()), "composite", expected, exit);
        let events = log.lock().clone();
        let expected = vec!["release c", "release b completed=false", "release a"];
        crate::assert_with_log!(events == expected, "all released", expected, events);
        crate::test_complete!("every_release_runs_when_some_fail");
    }

    #[test]
    fn cancellation_between_steps_unwinds_prefix() {
        init_test("cancellation_between_steps_unwinds_prefix");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let first_log = Arc::clone(&log);
        let rest_log = Arc::clone(&log);
        let exit: Exit<(), String> = run_test(|cx| async move {
            let signal = cx.signal().clone();
            // The request lands while the first acquire is masked.
            let first = Resource::<&'static str, String>::new(
                move |_cx| async move {
                    signal.request(CancelReason::user("mid-chain"));
                    Ok("a")
                },
                move |value, case| async move {
                    first_log
                        .lock()
                        .push(format!("release {value} cancelled={}", case.is_cancelled()));
                    Ok(())
                },
            );
            first
                .and_then(move |_| tracked(&rest_log, "b"))
                .use_with(&cx, |_| async { Ok(()) })
                .await
        });
        crate::assert_exit_cancelled!(exit);
        let events = log.lock().clone();
        let expected = vec!["release a cancelled=true"];
        crate::assert_with_log!(events == expected, "only the prefix ran", expected, events);
        crate::test_complete!("cancellation_between_steps_unwinds_prefix");
    }

    #[test]
    fn map_and_pure() {
        init_test("map_and_pure");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let res = tracked(&log, "conn")
            .map(str::len)
            .zip(Resource::pure(10_usize));
        let exit: Exit<usize, String> = run_test(|cx| async move {
            res.use_with(&cx, |(len, ten)| async move { Ok(len + ten) }).await
        });
        crate::assert_exit_ok!(exit, 14);
        crate::assert_with_log!(log.lock().len() == 2, "acquire and release", 2, log.lock().len());
        crate::test_complete!("map_and_pure");
    }

    #[test]
    fn allocate_hands_over_release() {
        init_test("allocate_hands_over_release");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let res = tracked(&log, "a").zip(tracked(&log, "b"));
        let inner = Arc::clone(&log);
        let exit: Exit<usize, String> = run_test(|cx| async move {
            let ((a, b), stack) = res.allocate(&cx).await?;
            let pending = stack.len();
            inner.lock().push(format!("using {a}{b}"));
            stack.release(&cx, ExitCase::Completed(())).await?;
            Ok(pending)
        });
        crate::assert_exit_ok!(exit, 2);
        let events = log.lock().clone();
        let expected = vec![
            "acquire a",
            "acquire b",
            "using ab",
            "release b completed=true",
            "release a completed=true",
        ];
        crate::assert_with_log!(events == expected, "manual release", expected, events);
        crate::test_complete!("allocate_hands_over_release");
    }
}
