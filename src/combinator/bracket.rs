//! Bracket combinators for resource safety.
//!
//! `acquire` runs inside an uncancellable section, so a resource is either
//! not acquired at all or fully acquired and owned by the bracket. Once
//! acquired, `release` runs exactly once on every path out of `use`:
//! success, typed failure, panic and cancellation. Release itself is
//! uncancellable.
//!
//! Outcomes combine as follows:
//!
//! | use | release | result |
//! |-----|---------|--------|
//! | `Ok(v)` | ok | `Ok(v)` |
//! | `Ok(v)` | fails | release cause |
//! | `Err(c)` | ok | `Err(c)` |
//! | `Err(c)` | fails | `Composite([c, release cause])` |
//!
//! A use body that completes while an unmasked cancellation request is
//! pending is reported as cancelled: release sees `ExitCase::Cancelled` and
//! the bracket returns `Cancelled`.

use crate::cx::Cx;
use crate::tracing_compat::warn;
use crate::types::{Cause, Exit, ExitCase};
use crate::util::catch_unwind::{guarded, guarded_exit};
use std::future::Future;

/// Acquires a resource, uses it, and releases it with the way `use` ended.
///
/// # Example
///
/// ```ignore
/// let rows = bracket_case(
///     &cx,
///     async { Ok(pool.checkout()?) },
///     |conn| async move { conn.query("select 1").await },
///     |conn, case| async move {
///         if case.is_completed() { conn.commit() } else { conn.rollback() }
///     },
/// )
/// .await;
/// ```
pub async fn bracket_case<R, T, E, A, U, UF, Rel, RelF>(
    cx: &Cx,
    acquire: A,
    use_fn: U,
    release: Rel,
) -> Exit<T, E>
where
    A: Future<Output = Exit<R, E>>,
    U: FnOnce(R) -> UF,
    UF: Future<Output = Exit<T, E>>,
    Rel: FnOnce(R, ExitCase<T, E>) -> RelF,
    RelF: Future<Output = Result<(), E>>,
    R: Clone,
    T: Clone,
    E: Clone,
{
    bracket_core(cx, acquire, use_fn, move |resource, exit: &Exit<T, E>| {
        release(resource, ExitCase::from_exit(exit))
    })
    .await
}

/// Like [`bracket_case`] with a release that ignores how `use` ended.
pub async fn bracket<R, T, E, A, U, UF, Rel, RelF>(
    cx: &Cx,
    acquire: A,
    use_fn: U,
    release: Rel,
) -> Exit<T, E>
where
    A: Future<Output = Exit<R, E>>,
    U: FnOnce(R) -> UF,
    UF: Future<Output = Exit<T, E>>,
    Rel: FnOnce(R) -> RelF,
    RelF: Future<Output = Result<(), E>>,
    R: Clone,
{
    bracket_core(cx, acquire, use_fn, move |resource, _: &Exit<T, E>| {
        release(resource)
    })
    .await
}

/// Runs `finalizer` after `work`, whatever the outcome.
pub async fn guarantee<T, E, W, Fin, FinF>(cx: &Cx, work: W, finalizer: Fin) -> Exit<T, E>
where
    W: Future<Output = Exit<T, E>>,
    Fin: FnOnce() -> FinF,
    FinF: Future<Output = Result<(), E>>,
{
    bracket_core(
        cx,
        async { Ok(()) },
        move |()| work,
        move |(), _: &Exit<T, E>| finalizer(),
    )
    .await
}

/// Runs `finalizer` after `work` with the way it ended.
///
/// The completed value is forgotten; the finalizer sees
/// `ExitCase<(), E>`.
pub async fn guarantee_case<T, E, W, Fin, FinF>(cx: &Cx, work: W, finalizer: Fin) -> Exit<T, E>
where
    W: Future<Output = Exit<T, E>>,
    Fin: FnOnce(ExitCase<(), E>) -> FinF,
    FinF: Future<Output = Result<(), E>>,
    E: Clone,
{
    bracket_core(
        cx,
        async { Ok(()) },
        move |()| work,
        move |(), exit: &Exit<T, E>| finalizer(exit_case_of(exit)),
    )
    .await
}

/// Runs `finalizer` only if `work` ends cancelled.
pub async fn on_cancel<T, E, W, Fin, FinF>(cx: &Cx, work: W, finalizer: Fin) -> Exit<T, E>
where
    W: Future<Output = Exit<T, E>>,
    Fin: FnOnce() -> FinF,
    FinF: Future<Output = Result<(), E>>,
{
    bracket_core(
        cx,
        async { Ok(()) },
        move |()| work,
        move |(), exit: &Exit<T, E>| {
            let cancelled = matches!(exit, Err(Cause::Cancelled(_)));
            async move {
                if cancelled {
                    finalizer().await
                } else {
                    Ok(())
                }
            }
        },
    )
    .await
}

pub(crate) fn exit_case_of<T, E: Clone>(exit: &Exit<T, E>) -> ExitCase<(), E> {
    match exit {
        Ok(_) => ExitCase::Completed(()),
        Err(cause) => ExitCase::from_cause(cause.clone()),
    }
}

async fn bracket_core<R, T, E, A, U, UF, Rel, RelF>(
    cx: &Cx,
    acquire: A,
    use_fn: U,
    release: Rel,
) -> Exit<T, E>
where
    A: Future<Output = Exit<R, E>>,
    U: FnOnce(R) -> UF,
    UF: Future<Output = Exit<T, E>>,
    Rel: FnOnce(R, &Exit<T, E>) -> RelF,
    RelF: Future<Output = Result<(), E>>,
    R: Clone,
{
    let resource = cx.uncancellable(guarded_exit(move || acquire)).await??;
    let held = resource.clone();

    let exit = settle(cx, guarded_exit(move || use_fn(resource)).await);
    let released = cx
        .masked(guarded(|| release(held, &exit)))
        .await
        .map_err(Cause::Panicked)
        .and_then(|outcome| outcome.map_err(Cause::Failure));
    combine_release(cx, exit, released)
}

/// Turns a successful exit into `Cancelled` if an unmasked request is
/// pending.
pub(crate) fn settle<T, E>(cx: &Cx, exit: Exit<T, E>) -> Exit<T, E> {
    match exit {
        Ok(value) => match cx.pending_cancel() {
            Some(reason) => {
                drop(value);
                Err(Cause::Cancelled(reason))
            }
            None => Ok(value),
        },
        Err(cause) => Err(cause),
    }
}

/// Combines a use exit with the outcome of its release.
pub(crate) fn combine_release<T, E>(
    cx: &Cx,
    exit: Exit<T, E>,
    released: Result<(), Cause<E>>,
) -> Exit<T, E> {
    match (exit, released) {
        (exit, Ok(())) => exit,
        (Ok(_), Err(release_cause)) => {
            warn!(task = %cx.task_id(), "release failed after successful use");
            Err(release_cause)
        }
        (Err(use_cause), Err(release_cause)) => {
            warn!(task = %cx.task_id(), "release failed after failed use");
            Err(use_cause.compose(release_cause))
        }
    }
}
