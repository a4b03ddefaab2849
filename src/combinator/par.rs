//! Parallel combinators.
//!
//! Every branch is forked as a connected fiber on the given context; a
//! branch never runs inline on the caller. The combinators share one
//! fail-fast protocol:
//!
//! - The first branch to fail cancels every sibling (`FailFast`) and waits
//!   for all of them. The original cause is returned unwrapped unless a
//!   sibling also failed on its own while draining, in which case the
//!   failures are composed, first observed first.
//! - If the caller is cancelled while waiting, every branch is cancelled
//!   (`ParentCancelled`) and awaited before `Cancelled` propagates.
//! - A result is produced only once every branch succeeded, in input order.

use super::race::{Either, Race3};
use crate::cx::Cx;
use crate::fiber::{FiberGroup, GroupEvent, fork_connected};
use crate::runtime::ExecutionContext;
use crate::sync::Semaphore;
use crate::tracing_compat::debug;
use crate::types::{CancelReason, Cause, Exit, PanicPayload};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

/// Waits for every fiber in `group`, failing fast.
async fn collect_all<T, E>(cx: &Cx, mut group: FiberGroup<T, E>) -> Exit<Vec<T>, E> {
    let mut results: Vec<Option<T>> = (0..group.len()).map(|_| None).collect();
    while let Some(event) = group.next(cx).await {
        match event {
            GroupEvent::Exited(index, Ok(value)) => results[index] = Some(value),
            GroupEvent::Exited(index, Err(cause)) => {
                debug!(
                    task = %cx.task_id(),
                    branch = index,
                    remaining = group.live(),
                    "branch failed, cancelling siblings"
                );
                let drained = group.cancel_and_drain(&CancelReason::sibling_failed()).await;
                return Err(with_sibling_failures(cause, drained));
            }
            GroupEvent::Interrupted(reason) => {
                debug!(task = %cx.task_id(), remaining = group.live(), "caller cancelled, draining branches");
                group.cancel_and_drain(&CancelReason::parent_cancelled()).await;
                return Err(Cause::Cancelled(reason));
            }
        }
    }
    Ok(results.into_iter().flatten().collect())
}

/// Composes genuine sibling failures after the primary cause.
///
/// Siblings that merely ended cancelled are not failures of their own.
fn with_sibling_failures<T, E>(primary: Cause<E>, drained: Vec<(usize, Exit<T, E>)>) -> Cause<E> {
    drained
        .into_iter()
        .filter_map(|(_, exit)| exit.err())
        .filter(|cause| !cause.leaves().iter().all(|leaf| leaf.is_cancelled()))
        .fold(primary, Cause::compose)
}

fn lost_branch<E>() -> Cause<E> {
    Cause::Panicked(PanicPayload::new("parallel branch produced no result"))
}

/// Runs `f` over every item concurrently and collects the results in input
/// order.
///
/// Entry is a checkpoint. An empty input succeeds immediately.
pub async fn par_traverse<A, B, E, F, Fut>(
    cx: &Cx,
    ctx: &ExecutionContext,
    items: Vec<A>,
    f: F,
) -> Exit<Vec<B>, E>
where
    A: Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
    F: Fn(Cx, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Exit<B, E>> + Send + 'static,
{
    cx.checkpoint()?;
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let f = Arc::new(f);
    let mut group = FiberGroup::with_capacity(items.len());
    for item in items {
        let f = Arc::clone(&f);
        group.push(fork_connected(cx, ctx, move |cx| f(cx, item)));
    }
    collect_all(cx, group).await
}

/// Like [`par_traverse`] with at most `limit` items in flight.
///
/// Every item still gets its own fiber; the fibers queue on a semaphore.
/// A `limit` of zero is treated as one.
pub async fn par_traverse_n<A, B, E, F, Fut>(
    cx: &Cx,
    ctx: &ExecutionContext,
    limit: usize,
    items: Vec<A>,
    f: F,
) -> Exit<Vec<B>, E>
where
    A: Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
    F: Fn(Cx, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Exit<B, E>> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let f = Arc::new(f);
    par_traverse(cx, ctx, items, move |cx, item| {
        let permits = Arc::clone(&permits);
        let f = Arc::clone(&f);
        async move {
            let _permit = permits.acquire_owned(&cx, 1).await?;
            f(cx, item).await
        }
    })
    .await
}

/// Runs every work concurrently and collects the results in input order.
pub async fn par_sequence<T, E, W, Fut>(
    cx: &Cx,
    ctx: &ExecutionContext,
    works: Vec<W>,
) -> Exit<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
    W: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Exit<T, E>> + Send + 'static,
{
    cx.checkpoint()?;
    let mut group = FiberGroup::with_capacity(works.len());
    for work in works {
        group.push(fork_connected(cx, ctx, work));
    }
    collect_all(cx, group).await
}

/// Runs two works concurrently and combines their values.
pub async fn par_map2<A, B, C, E, FA, FB, FutA, FutB, G>(
    cx: &Cx,
    ctx: &ExecutionContext,
    a: FA,
    b: FB,
    combine: G,
) -> Exit<C, E>
where
    FA: FnOnce(Cx) -> FutA + Send + 'static,
    FB: FnOnce(Cx) -> FutB + Send + 'static,
    FutA: Future<Output = Exit<A, E>> + Send + 'static,
    FutB: Future<Output = Exit<B, E>> + Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
    G: FnOnce(A, B) -> C,
{
    cx.checkpoint()?;
    let mut group = FiberGroup::with_capacity(2);
    group.push(fork_connected(cx, ctx, move |cx| async move {
        a(cx).await.map(Either::Left)
    }));
    group.push(fork_connected(cx, ctx, move |cx| async move {
        b(cx).await.map(Either::Right)
    }));
    let mut values = collect_all(cx, group).await?.into_iter();
    match (values.next(), values.next()) {
        (Some(Either::Left(a)), Some(Either::Right(b))) => Ok(combine(a, b)),
        _ => Err(lost_branch()),
    }
}

/// Runs three works concurrently and combines their values.
pub async fn par_map3<A, B, C, D, E, FA, FB, FC, FutA, FutB, FutC, G>(
    cx: &Cx,
    ctx: &ExecutionContext,
    a: FA,
    b: FB,
    c: FC,
    combine: G,
) -> Exit<D, E>
where
    FA: FnOnce(Cx) -> FutA + Send + 'static,
    FB: FnOnce(Cx) -> FutB + Send + 'static,
    FC: FnOnce(Cx) -> FutC + Send + 'static,
    FutA: Future<Output = Exit<A, E>> + Send + 'static,
    FutB: Future<Output = Exit<B, E>> + Send + 'static,
    FutC: Future<Output = Exit<C, E>> + Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    E: Send + 'static,
    G: FnOnce(A, B, C) -> D,
{
    cx.checkpoint()?;
    let mut group = FiberGroup::with_capacity(3);
    group.push(fork_connected(cx, ctx, move |cx| async move {
        a(cx).await.map(Race3::First)
    }));
    group.push(fork_connected(cx, ctx, move |cx| async move {
        b(cx).await.map(Race3::Second)
    }));
    group.push(fork_connected(cx, ctx, move |cx| async move {
        c(cx).await.map(Race3::Third)
    }));
    let mut values = collect_all(cx, group).await?.into_iter();
    match (values.next(), values.next(), values.next()) {
        (Some(Race3::First(a)), Some(Race3::Second(b)), Some(Race3::Third(c))) => {
            Ok(combine(a, b, c))
        }
        _ => Err(lost_branch()),
    }
}

/// Containers whose elements can be mapped concurrently, keeping their
/// shape.
pub trait Traversable: Sized {
    /// Element type.
    type Item;
    /// The same container holding `B`s.
    type Mapped<B>;

    /// Applies `f` to every element concurrently with [`par_traverse`]
    /// semantics.
    fn map_concurrently<B, E, F, Fut>(
        self,
        cx: &Cx,
        ctx: &ExecutionContext,
        f: F,
    ) -> impl Future<Output = Exit<Self::Mapped<B>, E>>
    where
        B: Send + 'static,
        E: Send + 'static,
        F: Fn(Cx, Self::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exit<B, E>> + Send + 'static;
}

impl<T: Send + 'static> Traversable for Vec<T> {
    type Item = T;
    type Mapped<B> = Vec<B>;

    fn map_concurrently<B, E, F, Fut>(
        self,
        cx: &Cx,
        ctx: &ExecutionContext,
        f: F,
    ) -> impl Future<Output = Exit<Vec<B>, E>>
    where
        B: Send + 'static,
        E: Send + 'static,
        F: Fn(Cx, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exit<B, E>> + Send + 'static,
    {
        par_traverse(cx, ctx, self, f)
    }
}

impl<T: Send + 'static> Traversable for VecDeque<T> {
    type Item = T;
    type Mapped<B> = VecDeque<B>;

    fn map_concurrently<B, E, F, Fut>(
        self,
        cx: &Cx,
        ctx: &ExecutionContext,
        f: F,
    ) -> impl Future<Output = Exit<VecDeque<B>, E>>
    where
        B: Send + 'static,
        E: Send + 'static,
        F: Fn(Cx, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exit<B, E>> + Send + 'static,
    {
        let items: Vec<T> = self.into();
        async move { par_traverse(cx, ctx, items, f).await.map(VecDeque::from) }
    }
}

impl<T: Send + 'static> Traversable for Option<T> {
    type Item = T;
    type Mapped<B> = Option<B>;

    fn map_concurrently<B, E, F, Fut>(
        self,
        cx: &Cx,
        ctx: &ExecutionContext,
        f: F,
    ) -> impl Future<Output = Exit<Option<B>, E>>
    where
        B: Send + 'static,
        E: Send + 'static,
        F: Fn(Cx, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exit<B, E>> + Send + 'static,
    {
        let items: Vec<T> = self.into_iter().collect();
        async move {
            par_traverse(cx, ctx, items, f)
                .await
                .map(|mut mapped| mapped.pop())
        }
    }
}
