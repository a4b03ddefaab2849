//! Racing fibers.
//!
//! The first fiber to finish wins, whether it succeeded or failed. [`race_n`]
//! and [`race3`] cancel the losers with `RaceLost` and wait for them before
//! returning, so no racer outlives the race. [`race_pair`] and
//! [`race_triple`] hand the losers back instead; the caller must join or
//! cancel them. Losers that are simply dropped stay connected to the
//! caller and are cancelled when the caller's scope closes.
//!
//! If the caller is cancelled while the race is undecided, every racer is
//! cancelled and awaited before `Cancelled` propagates.

use crate::cx::Cx;
use crate::fiber::{Fiber, fork_connected};
use crate::runtime::ExecutionContext;
use crate::tracing_compat::debug;
use crate::types::{CancelReason, Cause, Exit};
use std::future::{Future, poll_fn};
use std::task::Poll;

/// The winner of a two-way race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Either<A, B> {
    /// The first racer won.
    Left(A),
    /// The second racer won.
    Right(B),
}

/// The winner of a three-way race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Race3<A, B, C> {
    /// The first racer won.
    First(A),
    /// The second racer won.
    Second(B),
    /// The third racer won.
    Third(C),
}

/// A decided two-way race with the loser still running.
#[derive(Debug)]
pub enum RacePair<A, B, E> {
    /// The first racer finished first.
    Left(Exit<A, E>, Fiber<B, E>),
    /// The second racer finished first.
    Right(Fiber<A, E>, Exit<B, E>),
}

/// A decided three-way race with both losers still running.
#[derive(Debug)]
pub enum RaceTriple<A, B, C, E> {
    /// The first racer finished first.
    First(Exit<A, E>, Fiber<B, E>, Fiber<C, E>),
    /// The second racer finished first.
    Second(Fiber<A, E>, Exit<B, E>, Fiber<C, E>),
    /// The third racer finished first.
    Third(Fiber<A, E>, Fiber<B, E>, Exit<C, E>),
}

/// Races two works on `ctx` and returns the winner with the live loser.
///
/// Entry is a checkpoint.
pub async fn race_pair<A, B, E, FA, FB, FutA, FutB>(
    cx: &Cx,
    ctx: &ExecutionContext,
    a: FA,
    b: FB,
) -> Exit<RacePair<A, B, E>, E>
where
    FA: FnOnce(Cx) -> FutA + Send + 'static,
    FB: FnOnce(Cx) -> FutB + Send + 'static,
    FutA: Future<Output = Exit<A, E>> + Send + 'static,
    FutB: Future<Output = Exit<B, E>> + Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
{
    cx.checkpoint()?;
    let fa = fork_connected(cx, ctx, a);
    let fb = fork_connected(cx, ctx, b);
    let decided = poll_fn(|task_cx| {
        if let Poll::Ready(exit) = fa.poll_exit(task_cx) {
            return Poll::Ready(Ok(Either::Left(exit)));
        }
        if let Poll::Ready(exit) = fb.poll_exit(task_cx) {
            return Poll::Ready(Ok(Either::Right(exit)));
        }
        cx.poll_cancel(task_cx).map(Err)
    })
    .await;
    match decided {
        Ok(Either::Left(exit)) => Ok(RacePair::Left(exit, fb)),
        Ok(Either::Right(exit)) => Ok(RacePair::Right(fa, exit)),
        Err(reason) => {
            debug!(task = %cx.task_id(), "race interrupted, draining racers");
            let _ = fa.cancel_with(CancelReason::parent_cancelled()).await;
            let _ = fb.cancel_with(CancelReason::parent_cancelled()).await;
            Err(Cause::Cancelled(reason))
        }
    }
}

/// Races three works on `ctx` and returns the winner with both live losers.
///
/// Entry is a checkpoint.
pub async fn race_triple<A, B, C, E, FA, FB, FC, FutA, FutB, FutC>(
    cx: &Cx,
    ctx: &ExecutionContext,
    a: FA,
    b: FB,
    c: FC,
) -> Exit<RaceTriple<A, B, C, E>, E>
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
{
    cx.checkpoint()?;
    let fa = fork_connected(cx, ctx, a);
    let fb = fork_connected(cx, ctx, b);
    let fc = fork_connected(cx, ctx, c);
    let decided = poll_fn(|task_cx| {
        if let Poll::Ready(exit) = fa.poll_exit(task_cx) {
            return Poll::Ready(Ok(Race3::First(exit)));
        }
        if let Poll::Ready(exit) = fb.poll_exit(task_cx) {
            return Poll::Ready(Ok(Race3::Second(exit)));
        }
        if let Poll::Ready(exit) = fc.poll_exit(task_cx) {
            return Poll::Ready(Ok(Race3::Third(exit)));
        }
        cx.poll_cancel(task_cx).map(Err)
    })
    .await;
    match decided {
        Ok(Race3::First(exit)) => Ok(RaceTriple::First(exit, fb, fc)),
        Ok(Race3::Second(exit)) => Ok(RaceTriple::Second(fa, exit, fc)),
        Ok(Race3::Third(exit)) => Ok(RaceTriple::Third(fa, fb, exit)),
        Err(reason) => {
            debug!(task = %cx.task_id(), "race interrupted, draining racers");
            for signal in [fa.signal(), fb.signal(), fc.signal()] {
                signal.request(CancelReason::parent_cancelled());
            }
            let _ = fa.wait().await;
            let _ = fb.wait().await;
            let _ = fc.wait().await;
            Err(Cause::Cancelled(reason))
        }
    }
}

/// Races two works and cancels the loser.
///
/// Returns the winner's exit, failure included, after the loser has fully
/// unwound.
pub async fn race_n<A, B, E, FA, FB, FutA, FutB>(
    cx: &Cx,
    ctx: &ExecutionContext,
    a: FA,
    b: FB,
) -> Exit<Either<A, B>, E>
where
    FA: FnOnce(Cx) -> FutA + Send + 'static,
    FB: FnOnce(Cx) -> FutB + Send + 'static,
    FutA: Future<Output = Exit<A, E>> + Send + 'static,
    FutB: Future<Output = Exit<B, E>> + Send + 'static,
    A: Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
{
    match race_pair(cx, ctx, a, b).await? {
        RacePair::Left(exit, loser) => {
            let _ = loser.cancel_with(CancelReason::race_lost()).await;
            exit.map(Either::Left)
        }
        RacePair::Right(loser, exit) => {
            let _ = loser.cancel_with(CancelReason::race_lost()).await;
            exit.map(Either::Right)
        }
    }
}

/// Races three works and cancels both losers.
pub async fn race3<A, B, C, E, FA, FB, FC, FutA, FutB, FutC>(
    cx: &Cx,
    ctx: &ExecutionContext,
    a: FA,
    b: FB,
    c: FC,
) -> Exit<Race3<A, B, C>, E>
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
{
    match race_triple(cx, ctx, a, b, c).await? {
        RaceTriple::First(exit, b, c) => {
            cancel_losers(b, c).await;
            exit.map(Race3::First)
        }
        RaceTriple::Second(a, exit, c) => {
            cancel_losers(a, c).await;
            exit.map(Race3::Second)
        }
        RaceTriple::Third(a, b, exit) => {
            cancel_losers(a, b).await;
            exit.map(Race3::Third)
        }
    }
}

async fn cancel_losers<X, Y, E>(x: Fiber<X, E>, y: Fiber<Y, E>) {
    // Request both before waiting so they unwind concurrently.
    x.request_cancel_with(CancelReason::race_lost());
    y.request_cancel_with(CancelReason::race_lost());
    let _ = x.wait().await;
    let _ = y.wait().await;
}
