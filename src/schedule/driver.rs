//! Drivers that run an action under a [`Schedule`].
//!
//! Both drivers check for cancellation before every execution and pause
//! with [`sleep`], which is itself a checkpoint. Cancellation is never fed
//! to a schedule and never retried. [`retry`] propagates it as
//! [`Cause::Cancelled`]; [`repeat`] stops with the output accumulated so
//! far when it has one.

use super::{Decision, Schedule};
use crate::cx::Cx;
use crate::time::sleep;
use crate::tracing_compat::{debug, trace};
use crate::types::{Cancelled, Cause, Exit};
use std::future::Future;
use std::time::Duration;

async fn pause(cx: &Cx, delay: Duration) -> Result<(), Cancelled> {
    if delay.is_zero() {
        cx.checkpoint()
    } else {
        sleep(cx, delay).await
    }
}

/// Runs `action` repeatedly while `schedule` continues, feeding each success
/// value into it.
///
/// Returns the schedule's final output once it stops. A cancellation seen
/// between executions also stops the loop, returning the latest output the
/// schedule produced; only when nothing has been produced yet does it end
/// with [`Cause::Cancelled`]. The first failure of `action` ends the loop
/// and is returned as is, and so is a cancellation `action` itself reports.
pub async fn repeat<S, T, E, F, Fut>(cx: &Cx, schedule: &S, action: F) -> Exit<S::Output, E>
where
    S: Schedule<Input = T>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Exit<T, E>>,
{
    repeat_or_else(cx, schedule, action, |cause, _| async move { Err(cause) }).await
}

/// Like [`repeat`], handing a failure of `action` to `or_else` along with
/// the last output the schedule produced, if any.
///
/// Cancellation bypasses `or_else`.
pub async fn repeat_or_else<S, T, E, F, Fut, H, HFut>(
    cx: &Cx,
    schedule: &S,
    mut action: F,
    or_else: H,
) -> Exit<S::Output, E>
where
    S: Schedule<Input = T>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Exit<T, E>>,
    H: FnOnce(Cause<E>, Option<S::Output>) -> HFut,
    HFut: Future<Output = Exit<S::Output, E>>,
{
    let mut state = schedule.initial();
    let mut last = None;
    let mut runs: u64 = 0;
    loop {
        if let Err(cancelled) = cx.checkpoint() {
            return stop_repeat(cx, runs, last, cancelled);
        }
        runs += 1;
        let value = match action().await {
            Ok(value) => value,
            Err(cause) if cause.is_cancelled() => return Err(cause),
            Err(cause) => {
                trace!(task = %cx.task_id(), runs, "repeat interrupted by failure");
                return or_else(cause, last).await;
            }
        };
        // Accumulating schedules extend their output in place only when no
        // older copy is still held.
        drop(last.take());
        match schedule.step(&value, state) {
            Decision::Done(output) => {
                trace!(task = %cx.task_id(), runs, "repeat schedule done");
                return Ok(output);
            }
            Decision::Continue {
                state: next,
                delay,
                output,
            } => {
                trace!(task = %cx.task_id(), runs, ?delay, "repeat continues");
                last = Some(output);
                state = next;
                if let Err(cancelled) = pause(cx, delay).await {
                    return stop_repeat(cx, runs, last, cancelled);
                }
            }
        }
    }
}

fn stop_repeat<O, E>(cx: &Cx, runs: u64, last: Option<O>, cancelled: Cancelled) -> Exit<O, E> {
    match last {
        Some(output) => {
            debug!(
                task = %cx.task_id(),
                runs,
                reason = %cancelled.reason,
                "repeat stopped by cancellation"
            );
            Ok(output)
        }
        None => Err(cancelled.into()),
    }
}

/// Runs `action` until it succeeds, feeding each failure into `schedule`.
///
/// Only [`Cause::Failure`] is retried. Cancellation, panics and composite
/// causes propagate immediately. When the schedule stops, the last failure
/// is re-raised unchanged.
pub async fn retry<S, T, E, F, Fut>(cx: &Cx, schedule: &S, action: F) -> Exit<T, E>
where
    S: Schedule<Input = E>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Exit<T, E>>,
{
    retry_or_else(cx, schedule, action, |err, _| async move {
        Err(Cause::Failure(err))
    })
    .await
}

/// Like [`retry`], calling `or_else` with the last failure and the
/// schedule's final output once the schedule stops.
pub async fn retry_or_else<S, T, E, F, Fut, H, HFut>(
    cx: &Cx,
    schedule: &S,
    mut action: F,
    or_else: H,
) -> Exit<T, E>
where
    S: Schedule<Input = E>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Exit<T, E>>,
    H: FnOnce(E, S::Output) -> HFut,
    HFut: Future<Output = Exit<T, E>>,
{
    let mut state = schedule.initial();
    let mut attempts: u64 = 0;
    loop {
        cx.checkpoint()?;
        attempts += 1;
        let err = match action().await {
            Ok(value) => return Ok(value),
            Err(Cause::Failure(err)) => err,
            Err(other) => return Err(other),
        };
        match schedule.step(&err, state) {
            Decision::Done(output) => {
                trace!(task = %cx.task_id(), attempts, "retry schedule exhausted");
                return or_else(err, output).await;
            }
            Decision::Continue { state: next, delay, .. } => {
                trace!(task = %cx.task_id(), attempts, ?delay, "retrying after failure");
                state = next;
                pause(cx, delay).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::fork_connected;
    use crate::schedule::{forever, identity, recurs, spaced};
    use crate::test_utils::{init_test_logging, run_test};
    use crate::types::CancelReason;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn repeat_recurs_three_runs_three_times() {
        init_test("repeat_recurs_three_runs_three_times");
        let counter = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&counter);
        let exit: Exit<u64, ()> = run_test(|cx| async move {
            repeat(&cx, &recurs(3), || {
                let counter = Arc::clone(&counter);
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
            })
            .await
        });
        crate::assert_exit_ok!(exit, 3);
        let runs = seen.load(Ordering::SeqCst);
        crate::assert_with_log!(runs == 3, "runs", 3, runs);
        crate::test_complete!("repeat_recurs_three_runs_three_times");
    }

    #[test]
    fn retry_recurs_three_reraises_last_failure() {
        init_test("retry_recurs_three_reraises_last_failure");
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let exit: Exit<(), u32> = run_test(|cx| async move {
            retry(&cx, &recurs(3), || {
                let attempts = Arc::clone(&attempts);
                async move { Err(Cause::Failure(attempts.fetch_add(1, Ordering::SeqCst) + 1)) }
            })
            .await
        });
        crate::assert_exit_failure!(exit, 3);
        let total = seen.load(Ordering::SeqCst);
        crate::assert_with_log!(total == 3, "attempts", 3, total);
        crate::test_complete!("retry_recurs_three_reraises_last_failure");
    }

    #[test]
    fn retry_stops_at_first_success() {
        init_test("retry_stops_at_first_success");
        let attempts = Arc::new(AtomicU32::new(0));
        let exit: Exit<&str, &str> = run_test(|cx| async move {
            retry(&cx, &spaced(Duration::from_millis(1)), || {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Cause::Failure("flaky"))
                    } else {
                        Ok("fine")
                    }
                }
            })
            .await
        });
        crate::assert_exit_ok!(exit, "fine");
        crate::test_complete!("retry_stops_at_first_success");
    }

    #[test]
    fn retry_does_not_retry_cancellation() {
        init_test("retry_does_not_retry_cancellation");
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let exit: Exit<(), ()> = run_test(|cx| async move {
            retry(&cx, &forever(), || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Cause::Cancelled(CancelReason::user("stop")))
                }
            })
            .await
        });
        crate::assert_exit_cancelled!(exit);
        let total = seen.load(Ordering::SeqCst);
        crate::assert_with_log!(total == 1, "single attempt", 1, total);
        crate::test_complete!("retry_does_not_retry_cancellation");
    }

    #[test]
    fn repeat_returns_accumulated_output_when_cancelled_during_pause() {
        init_test("repeat_returns_accumulated_output_when_cancelled_during_pause");
        let started = Instant::now();
        let exit: Exit<u64, ()> = run_test(|cx| async move {
            let signal = cx.signal().clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                signal.request(CancelReason::user("enough"));
            });
            repeat(&cx, &spaced(Duration::from_secs(30)), || async { Ok(()) }).await
        });
        // spaced reports its repetition count: one run finished before the pause.
        crate::assert_exit_ok!(exit, 1);
        let elapsed = started.elapsed();
        crate::assert_with_log!(elapsed < Duration::from_secs(5), "woke early", "< 5s", elapsed);
        crate::test_complete!("repeat_returns_accumulated_output_when_cancelled_during_pause");
    }

    #[test]
    fn repeat_collects_until_fiber_is_cancelled() {
        init_test("repeat_collects_until_fiber_is_cancelled");
        let runs = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&runs);
        let exit: Exit<(Vec<u32>, u32), ()> = run_test(|cx| async move {
            let ctx = cx.runtime().compute();
            let fiber = fork_connected(&cx, ctx, move |cx| async move {
                repeat(&cx, &spaced(Duration::from_millis(5)).zip_right(identity()).collect(), || {
                    let runs = Arc::clone(&counted);
                    async move { Ok::<_, Cause<()>>(runs.fetch_add(1, Ordering::SeqCst) + 1) }
                })
                .await
            });
            sleep(&cx, Duration::from_millis(30)).await?;
            let collected = fiber.cancel().await?;
            Ok((collected.as_ref().clone(), runs.load(Ordering::SeqCst)))
        });
        let (collected, total) = exit.expect("repeat keeps its output on cancellation");
        crate::assert_with_log!(!collected.is_empty(), "some runs collected", ">= 1", collected.len());
        let expected: Vec<u32> = (1..=total).collect();
        crate::assert_with_log!(collected == expected, "every run in order", expected, collected);
        crate::test_complete!("repeat_collects_until_fiber_is_cancelled");
    }

    #[test]
    fn repeat_cancelled_before_first_run_is_cancelled() {
        init_test("repeat_cancelled_before_first_run_is_cancelled");
        let runs = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&runs);
        let exit: Exit<u64, ()> = run_test(|cx| async move {
            cx.signal().request(CancelReason::user("early"));
            repeat(&cx, &forever(), || {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
        });
        crate::assert_exit_cancelled!(exit);
        let total = seen.load(Ordering::SeqCst);
        crate::assert_with_log!(total == 0, "never ran", 0, total);
        crate::test_complete!("repeat_cancelled_before_first_run_is_cancelled");
    }

    #[test]
    fn or_else_handlers_receive_last_state() {
        init_test("or_else_handlers_receive_last_state");
        let exit: Exit<u64, String> = run_test(|cx| async move {
            let rounds = AtomicU32::new(0);
            repeat_or_else(
                &cx,
                &forever(),
                || {
                    let round = rounds.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if round < 2 {
                            Ok(round)
                        } else {
                            Err(Cause::Failure(format!("round {round}")))
                        }
                    }
                },
                |cause, last| async move {
                    crate::assert_with_log!(
                        cause.failure().map(String::as_str) == Some("round 2"),
                        "cause",
                        "round 2",
                        cause
                    );
                    Ok(last.unwrap_or_default() * 10)
                },
            )
            .await
        });
        crate::assert_exit_ok!(exit, 20);

        let fallback: Exit<&str, &str> = run_test(|cx| async move {
            retry_or_else(
                &cx,
                &recurs(2),
                || async { Err(Cause::Failure("down")) },
                |err, tries| async move {
                    crate::assert_with_log!(err == "down", "last error", "down", err);
                    crate::assert_with_log!(tries == 2, "schedule output", 2, tries);
                    Ok("cached")
                },
            )
            .await
        });
        crate::assert_exit_ok!(fallback, "cached");
        crate::test_complete!("or_else_handlers_receive_last_state");
    }
}
