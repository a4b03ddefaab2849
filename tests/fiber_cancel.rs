//! End-to-end cancellation of fiber trees.

use fiberguard::combinator::{guarantee, never};
use fiberguard::runtime::ExecutionContext;
use fiberguard::test_utils::{init_test_logging, run_test};
use fiberguard::{
    CancelKind, CancelReason, CancelTrigger, Cause, Exit, Fiber, FiberStatus, eval_on,
    fork_and_forget, fork_connected, fork_scoped, sleep,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

fn init_test(name: &str) {
    init_test_logging();
    fiberguard::test_phase!(name);
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn cancelling_a_parent_unwinds_the_whole_subtree_first() {
    init_test("cancelling_a_parent_unwinds_the_whole_subtree_first");
    let released = Arc::new(AtomicUsize::new(0));
    let exit: Exit<usize, ()> = run_test(|cx| async move {
        let ctx = cx.runtime().compute();
        let counter = Arc::clone(&released);
        let parent = fork_connected(&cx, ctx, move |cx| async move {
            let ctx = cx.runtime().compute();
            for _ in 0..3 {
                let counter = Arc::clone(&counter);
                let _child: Fiber<(), ()> = fork_connected(&cx, ctx, move |cx| async move {
                    let idle = async {
                        sleep(&cx, Duration::from_secs(60)).await?;
                        Ok::<(), Cause<()>>(())
                    };
                    guarantee(&cx, idle, move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
                });
            }
            never::<()>(&cx).await?;
            Ok::<(), Cause<()>>(())
        });
        sleep(&cx, ms(30)).await?;
        let parent_exit = parent.cancel().await;
        fiberguard::assert_exit_cancelled!(parent_exit);
        Ok(released.load(Ordering::SeqCst))
    });
    fiberguard::assert_exit_ok!(exit, 3);
    fiberguard::test_complete!("cancelling_a_parent_unwinds_the_whole_subtree_first");
}

#[test]
fn uncancellable_section_finishes_before_cancel_is_observed() {
    init_test("uncancellable_section_finishes_before_cancel_is_observed");
    let finished = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&finished);
    let exit: Exit<(), ()> = run_test(|cx| async move {
        let ctx = cx.runtime().compute();
        let fiber = fork_connected(&cx, ctx, move |cx| async move {
            cx.uncancellable(async {
                sleep(&cx, ms(40)).await?;
                finished.store(true, Ordering::SeqCst);
                Ok::<(), Cause<()>>(())
            })
            .await??;
            cx.checkpoint()?;
            Ok::<(), Cause<()>>(())
        });
        sleep(&cx, ms(10)).await?;
        let exit = fiber.cancel().await;
        match exit {
            Err(Cause::Cancelled(reason)) => {
                fiberguard::assert_with_log!(
                    reason.kind() == CancelKind::User,
                    "reason",
                    CancelKind::User,
                    reason.kind()
                );
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        Ok(())
    });
    fiberguard::assert_exit_ok!(exit, ());
    let done = seen.load(Ordering::SeqCst);
    fiberguard::assert_with_log!(done, "masked section completed", true, done);
    fiberguard::test_complete!("uncancellable_section_finishes_before_cancel_is_observed");
}

#[test]
fn failures_stay_inside_a_fiber_until_join() {
    init_test("failures_stay_inside_a_fiber_until_join");
    let exit: Exit<&str, &str> = run_test(|cx| async move {
        let ctx = cx.runtime().blocking();
        let fiber: Fiber<(), &str> =
            fork_connected(&cx, ctx, |_cx| async { Err(Cause::Failure("disk full")) });
        sleep(&cx, ms(20)).await?;
        let status = fiber.status();
        fiberguard::assert_with_log!(
            status == FiberStatus::Failed,
            "failed quietly",
            FiberStatus::Failed,
            status
        );
        match fiber.join(&cx).await {
            Err(Cause::Failure(err)) => Ok(err),
            other => panic!("expected failure, got {other:?}"),
        }
    });
    fiberguard::assert_exit_ok!(exit, "disk full");
    fiberguard::test_complete!("failures_stay_inside_a_fiber_until_join");
}

#[test]
fn scoped_and_forgotten_fibers_follow_their_own_owners() {
    init_test("scoped_and_forgotten_fibers_follow_their_own_owners");
    let trigger = CancelTrigger::new();
    let shutdown = trigger.clone();
    let exit: Exit<(bool, bool), ()> = run_test(|cx| async move {
        let ctx = cx.runtime().compute();
        let scoped: Fiber<(), ()> = fork_scoped(&cx, ctx, &trigger, |cx| async move {
            never::<()>(&cx).await?;
            Ok(())
        });
        let forgotten: Fiber<(), ()> = fork_and_forget(&cx, ctx, |cx| async move {
            never::<()>(&cx).await?;
            Ok(())
        });
        sleep(&cx, ms(20)).await?;
        let both_running = !scoped.is_finished() && !forgotten.is_finished();

        shutdown.cancel_with(CancelReason::shutdown());
        let scoped_exit = scoped.join(&cx).await;
        let scoped_stopped = matches!(scoped_exit, Err(Cause::Cancelled(_)));
        let forgotten_running = !forgotten.is_finished();
        fiberguard::assert_with_log!(
            forgotten_running,
            "trigger does not reach forgotten fiber",
            true,
            forgotten_running
        );
        let _ = forgotten.cancel().await;
        Ok((both_running, scoped_stopped))
    });
    fiberguard::assert_exit_ok!(exit, (true, true));
    fiberguard::test_complete!("scoped_and_forgotten_fibers_follow_their_own_owners");
}

#[test]
fn eval_on_runs_on_the_requested_context() {
    init_test("eval_on_runs_on_the_requested_context");
    let exit: Exit<bool, ()> = run_test(|cx| async move {
        let single = cx.runtime().single();
        let target = single.id();
        let observed = eval_on(&cx, single, |_cx| async {
            Ok::<_, Cause<()>>(ExecutionContext::current_id())
        })
        .await?;
        Ok(observed == Some(target))
    });
    fiberguard::assert_exit_ok!(exit, true);
    fiberguard::test_complete!("eval_on_runs_on_the_requested_context");
}
