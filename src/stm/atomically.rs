//! The transaction driver.

use super::txn::{Restart, StmError, Txn};
use crate::cx::Cx;
use crate::runtime::yield_now;
use crate::tracing_compat::trace;
use crate::types::{Cause, Exit};

/// Runs `transaction` until it commits.
///
/// Each attempt starts from a fresh snapshot. Conflicting attempts are
/// discarded without effect and rerun. When the body calls
/// [`Txn::retry`], the fiber suspends until another transaction commits to a
/// variable the attempt read. [`StmError::Abort`] discards the attempt and
/// fails with [`Cause::Failure`].
///
/// An attempt can only read versions committed before it began. Reading a
/// variable that another transaction committed after that point restarts
/// the attempt straight away, even if no one writes the variable again
/// before this attempt would commit. The rerun sees the new version, so a
/// single late commit costs exactly one extra attempt; a steady stream of
/// writers can keep a long reader restarting.
///
/// Every attempt begins with a cancellation checkpoint and a blocked retry
/// wakes on cancellation, so a cancelled fiber returns
/// [`Cause::Cancelled`] with none of its writes applied.
///
/// The body may run many times and must not have side effects outside the
/// transaction.
///
/// # Example
///
/// ```ignore
/// let from = TVar::new(100);
/// let to = TVar::new(0);
/// atomically(&cx, |tx| {
///     let balance = from.read(tx)?;
///     check(tx, balance >= 30)?;
///     from.write(tx, balance - 30);
///     to.modify(tx, |b| b + 30)?;
///     Ok::<_, StmError<()>>(())
/// })
/// .await?;
/// ```
pub async fn atomically<T, E, F>(cx: &Cx, mut transaction: F) -> Exit<T, E>
where
    F: FnMut(&mut Txn) -> Result<T, StmError<E>>,
{
    let mut attempt: u64 = 0;
    loop {
        cx.checkpoint()?;
        attempt += 1;
        let mut tx = Txn::begin();
        match transaction(&mut tx) {
            Ok(value) => {
                if tx.commit() {
                    if attempt > 1 {
                        trace!(task = %cx.task_id(), attempt, "transaction committed after restarts");
                    }
                    return Ok(value);
                }
                trace!(task = %cx.task_id(), attempt, "commit validation failed");
                yield_now().await;
            }
            Err(StmError::Restart(Restart::Conflict)) => {
                trace!(task = %cx.task_id(), attempt, "snapshot conflict");
                yield_now().await;
            }
            Err(StmError::Restart(Restart::Retry)) => {
                trace!(
                    task = %cx.task_id(),
                    attempt,
                    watching = tx.read_count(),
                    "transaction waiting for change"
                );
                tx.await_change(cx).await?;
            }
            Err(StmError::Abort(err)) => return Err(Cause::Failure(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::fork_connected;
    use crate::stm::{TQueue, TVar, check, or_else};
    use crate::test_utils::{init_test_logging, run_test};
    use crate::time::sleep;
    use crate::types::CancelReason;
    use std::time::Duration;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn transfer_commits_atomically() {
        init_test("transfer_commits_atomically");
        let from = TVar::new(100i64);
        let to = TVar::new(0i64);
        let (a, b) = (from.clone(), to.clone());
        let exit: Exit<i64, ()> = run_test(|cx| async move {
            atomically(&cx, |tx| {
                let balance = a.read(tx)?;
                a.write(tx, balance - 30);
                b.modify(tx, |x| x + 30)?;
                Ok(balance - 30)
            })
            .await
        });
        crate::assert_exit_ok!(exit, 70);
        crate::assert_with_log!(from.snapshot() == 70, "from", 70, from.snapshot());
        crate::assert_with_log!(to.snapshot() == 30, "to", 30, to.snapshot());
        crate::test_complete!("transfer_commits_atomically");
    }

    #[test]
    fn late_commit_costs_one_restart() {
        init_test("late_commit_costs_one_restart");
        let var = TVar::new(1u32);
        let inner = var.clone();
        let exit: Exit<(u32, u32), ()> = run_test(|cx| async move {
            let mut attempts = 0u32;
            let seen = atomically(&cx, |tx| {
                attempts += 1;
                if attempts == 1 {
                    // Lands after this attempt took its snapshot.
                    let mut writer = Txn::begin();
                    inner.write(&mut writer, 2);
                    if !writer.commit() {
                        return Err(StmError::abort(()));
                    }
                }
                Ok::<_, StmError<()>>(inner.read(tx)?)
            })
            .await?;
            Ok((seen, attempts))
        });
        crate::assert_exit_ok!(exit, (2, 2));
        crate::assert_with_log!(var.snapshot() == 2, "writer applied", 2, var.snapshot());
        crate::test_complete!("late_commit_costs_one_restart");
    }

    #[test]
    fn abort_discards_writes() {
        init_test("abort_discards_writes");
        let var = TVar::new(1u32);
        let inner = var.clone();
        let exit: Exit<(), &str> = run_test(|cx| async move {
            atomically(&cx, |tx| {
                inner.write(tx, 99);
                Err(StmError::abort("insufficient"))
            })
            .await
        });
        crate::assert_exit_failure!(exit, "insufficient");
        crate::assert_with_log!(var.snapshot() == 1, "unchanged", 1, var.snapshot());
        crate::test_complete!("abort_discards_writes");
    }

    #[test]
    fn retry_blocks_until_a_read_variable_changes() {
        init_test("retry_blocks_until_a_read_variable_changes");
        let gate = TVar::new(false);
        let exit: Exit<&str, ()> = run_test(|cx| async move {
            let ctx = cx.runtime().compute();
            let opener = gate.clone();
            let waiter = fork_connected(&cx, ctx, move |cx| async move {
                atomically(&cx, |tx| {
                    let open = gate.read(tx)?;
                    check(tx, open)?;
                    Ok("passed")
                })
                .await
            });
            sleep(&cx, Duration::from_millis(20)).await?;
            atomically(&cx, |tx| {
                opener.write(tx, true);
                Ok::<_, StmError<()>>(())
            })
            .await?;
            waiter.join(&cx).await
        });
        crate::assert_exit_ok!(exit, "passed");
        crate::test_complete!("retry_blocks_until_a_read_variable_changes");
    }

    #[test]
    fn blocked_retry_wakes_on_cancel() {
        init_test("blocked_retry_wakes_on_cancel");
        let queue: TQueue<u32> = TQueue::new();
        let untouched = queue.clone();
        let exit: Exit<u32, ()> = run_test(|cx| async move {
            let signal = cx.signal().clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                signal.request(CancelReason::user("stop waiting"));
            });
            atomically(&cx, |tx| Ok(queue.pop(tx)?)).await
        });
        crate::assert_exit_cancelled!(exit);
        let mut tx = Txn::begin();
        let remaining = untouched.len(&mut tx).expect("len");
        crate::assert_with_log!(remaining == 0, "queue untouched", 0, remaining);
        crate::test_complete!("blocked_retry_wakes_on_cancel");
    }

    #[test]
    fn or_else_takes_the_first_available_queue() {
        init_test("or_else_takes_the_first_available_queue");
        let busy: TQueue<&str> = TQueue::new();
        let idle: TQueue<&str> = TQueue::new();
        let (b, i) = (busy.clone(), idle.clone());
        let exit: Exit<&str, ()> = run_test(|cx| async move {
            atomically(&cx, |tx| {
                i.push(tx, "from idle")?;
                Ok::<_, StmError<()>>(())
            })
            .await?;
            atomically(&cx, |tx| {
                or_else(tx, |tx| Ok(b.pop(tx)?), |tx| Ok(i.pop(tx)?))
            })
            .await
        });
        crate::assert_exit_ok!(exit, "from idle");
        crate::test_complete!("or_else_takes_the_first_available_queue");
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        init_test("concurrent_increments_are_not_lost");
        let counter = TVar::new(0u64);
        let total = counter.clone();
        let exit: Exit<(), ()> = run_test(|cx| async move {
            let ctx = cx.runtime().compute();
            let mut fibers = Vec::new();
            for _ in 0..8 {
                let counter = counter.clone();
                fibers.push(fork_connected(&cx, ctx, move |cx| async move {
                    for _ in 0..50 {
                        atomically(&cx, |tx| {
                            counter.modify(tx, |n| n + 1)?;
                            Ok::<_, StmError<()>>(())
                        })
                        .await?;
                    }
                    Ok::<(), Cause<()>>(())
                }));
            }
            for fiber in fibers {
                fiber.join(&cx).await?;
            }
            Ok(())
        });
        crate::assert_exit_ok!(exit, ());
        crate::assert_with_log!(total.snapshot() == 400, "count", 400, total.snapshot());
        crate::test_complete!("concurrent_increments_are_not_lost");
    }
}
