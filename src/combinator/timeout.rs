//! Timeouts built from a race against a timer fiber.

use super::race::{Either, race_n};
use crate::cx::Cx;
use crate::runtime::ExecutionContext;
use crate::time::sleep;
use crate::types::{Cause, Exit};
use std::future::Future;
use std::time::Duration;

/// Runs `work` with a time limit.
///
/// Returns `Some(value)` if `work` finishes first and `None` if the timer
/// does. A failure of `work` before the deadline is returned as is.
///
/// When the timer wins, `work` is cancelled and awaited, so `duration` is a
/// lower bound on how long this takes: an uncancellable section inside
/// `work` delays the return until that section ends.
pub async fn timeout_or_none<T, E, F, Fut>(
    cx: &Cx,
    ctx: &ExecutionContext,
    duration: Duration,
    work: F,
) -> Exit<Option<T>, E>
where
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Exit<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let timer = move |cx: Cx| async move {
        sleep(&cx, duration).await?;
        Ok::<(), Cause<E>>(())
    };
    match race_n(cx, ctx, work, timer).await? {
        Either::Left(value) => Ok(Some(value)),
        Either::Right(()) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, run_test};
    use std::time::Instant;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn fast_work_returns_value() {
        init_test("fast_work_returns_value");
        let exit: Exit<Option<u8>, ()> = run_test(|cx| async move {
            let ctx = cx.runtime().compute();
            timeout_or_none(&cx, ctx, Duration::from_secs(5), |_cx| async { Ok(9) }).await
        });
        crate::assert_exit_ok!(exit, Some(9));
        crate::test_complete!("fast_work_returns_value");
    }

    #[test]
    fn slow_work_times_out_after_deadline() {
        init_test("slow_work_times_out_after_deadline");
        let exit: Exit<(Option<u8>, Duration), ()> = run_test(|cx| async move {
            let ctx = cx.runtime().compute();
            let start = Instant::now();
            let outcome = timeout_or_none(&cx, ctx, Duration::from_millis(30), |cx| async move {
                sleep(&cx, Duration::from_secs(30)).await?;
                Ok(1)
            })
            .await?;
            Ok((outcome, start.elapsed()))
        });
        let (outcome, elapsed) = exit.expect("timeout completes");
        crate::assert_with_log!(outcome.is_none(), "timed out", None::<u8>, outcome);
        crate::assert_with_log!(
            elapsed >= Duration::from_millis(30),
            "lower bound",
            ">= 30ms",
            elapsed
        );
        crate::test_complete!("slow_work_times_out_after_deadline");
    }

    #[test]
    fn uncancellable_section_delays_timeout() {
        init_test("uncancellable_section_delays_timeout");
        let exit: Exit<(Option<()>, Duration), ()> = run_test(|cx| async move {
            let ctx = cx.runtime().compute();
            let start = Instant::now();
            let outcome = timeout_or_none(&cx, ctx, Duration::from_millis(10), |cx| async move {
                cx.uncancellable(sleep(&cx, Duration::from_millis(80))).await??;
                cx.checkpoint()?;
                Ok(())
            })
            .await?;
            Ok((outcome, start.elapsed()))
        });
        let (outcome, elapsed) = exit.expect("timeout completes");
        crate::assert_with_log!(outcome.is_none(), "timer won", None::<()>, outcome);
        crate::assert_with_log!(
            elapsed >= Duration::from_millis(80),
            "waited for the masked section",
            ">= 80ms",
            elapsed
        );
        crate::test_complete!("uncancellable_section_delays_timeout");
    }

    #[test]
    fn early_failure_is_returned() {
        init_test("early_failure_is_returned");
        let exit: Exit<Option<()>, &str> = run_test(|cx| async move {
            let ctx = cx.runtime().compute();
            timeout_or_none(&cx, ctx, Duration::from_secs(5), |_cx| async {
                Err(Cause::Failure("bad input"))
            })
            .await
        });
        crate::assert_exit_failure!(exit, "bad input");
        crate::test_complete!("early_failure_is_returned");
    }
}
