//! Transactional memory under concurrent fibers.

use fiberguard::stm::{StmError, check};
use fiberguard::test_utils::{init_test_logging, run_test};
use fiberguard::{Cause, Exit, TArray, TQueue, TVar, atomically, fork_connected, sleep};
use std::time::Duration;

fn init_test(name: &str) {
    init_test_logging();
    fiberguard::test_phase!(name);
}

#[test]
fn concurrent_transfers_preserve_the_total() {
    init_test("concurrent_transfers_preserve_the_total");
    let accounts: Vec<TVar<i64>> = (0..5).map(|_| TVar::new(100)).collect();
    let shared = accounts.clone();
    let exit: Exit<(), ()> = run_test(|cx| async move {
        let ctx = cx.runtime().compute();
        let mut workers = Vec::new();
        for worker in 0..4u64 {
            let accounts = shared.clone();
            workers.push(fork_connected(&cx, ctx, move |cx| async move {
                let mut rng = fastrand::Rng::with_seed(worker);
                for _ in 0..40 {
                    let from = rng.usize(0..accounts.len());
                    let to = rng.usize(0..accounts.len());
                    let amount = rng.i64(1..20);
                    let (src, dst) = (accounts[from].clone(), accounts[to].clone());
                    atomically(&cx, |tx| {
                        let balance = src.read(tx)?;
                        if balance < amount {
                            return Ok(());
                        }
                        src.write(tx, balance - amount);
                        dst.modify(tx, |b| b + amount)?;
                        Ok::<_, StmError<()>>(())
                    })
                    .await?;
                }
                Ok::<(), Cause<()>>(())
            }));
        }
        for worker in workers {
            worker.join(&cx).await?;
        }
        Ok(())
    });
    fiberguard::assert_exit_ok!(exit, ());
    let total: i64 = accounts.iter().map(TVar::snapshot).sum();
    fiberguard::assert_with_log!(total == 500, "money conserved", 500, total);
    let negative = accounts.iter().any(|a| a.snapshot() < 0);
    fiberguard::assert_with_log!(!negative, "no overdraft", false, negative);
    fiberguard::test_complete!("concurrent_transfers_preserve_the_total");
}

#[test]
fn disjoint_array_slots_are_updated_independently() {
    init_test("disjoint_array_slots_are_updated_independently");
    let slots = TArray::new(4, 0u32);
    let shared = slots.clone();
    let exit: Exit<(), ()> = run_test(|cx| async move {
        let ctx = cx.runtime().compute();
        let mut workers = Vec::new();
        for index in 0..4usize {
            let slots = shared.clone();
            workers.push(fork_connected(&cx, ctx, move |cx| async move {
                for _ in 0..25 {
                    atomically(&cx, |tx| {
                        slots.transform(tx, index, |n| n + 1)?;
                        Ok::<_, StmError<()>>(())
                    })
                    .await?;
                }
                Ok::<(), Cause<()>>(())
            }));
        }
        for worker in workers {
            worker.join(&cx).await?;
        }
        Ok(())
    });
    fiberguard::assert_exit_ok!(exit, ());
    let values = slots.snapshot();
    fiberguard::assert_with_log!(values == [25; 4], "each slot", [25; 4], values);
    fiberguard::test_complete!("disjoint_array_slots_are_updated_independently");
}

#[test]
fn bounded_queue_hands_items_over_in_order() {
    init_test("bounded_queue_hands_items_over_in_order");
    let queue: TQueue<u32> = TQueue::bounded(2);
    let exit: Exit<Vec<u32>, ()> = run_test(|cx| async move {
        let ctx = cx.runtime().compute();
        let producer_queue = queue.clone();
        let producer = fork_connected(&cx, ctx, move |cx| async move {
            for item in 0..10 {
                atomically(&cx, |tx| {
                    producer_queue.push(tx, item)?;
                    Ok::<_, StmError<()>>(())
                })
                .await?;
            }
            Ok::<(), Cause<()>>(())
        });
        let mut received = Vec::new();
        while received.len() < 10 {
            if received.len() % 3 == 0 {
                sleep(&cx, Duration::from_millis(2)).await?;
            }
            let item = atomically(&cx, |tx| Ok::<_, StmError<()>>(queue.pop(tx)?)).await?;
            received.push(item);
        }
        producer.join(&cx).await?;
        Ok(received)
    });
    fiberguard::assert_exit_ok!(exit, (0..10).collect::<Vec<u32>>());
    fiberguard::test_complete!("bounded_queue_hands_items_over_in_order");
}

#[test]
fn check_waits_for_a_condition_set_by_another_fiber() {
    init_test("check_waits_for_a_condition_set_by_another_fiber");
    let stock = TVar::new(0u32);
    let exit: Exit<u32, ()> = run_test(|cx| async move {
        let ctx = cx.runtime().compute();
        let restock = stock.clone();
        let supplier = fork_connected(&cx, ctx, move |cx| async move {
            for _ in 0..3 {
                sleep(&cx, Duration::from_millis(5)).await?;
                atomically(&cx, |tx| {
                    restock.modify(tx, |n| n + 2)?;
                    Ok::<_, StmError<()>>(())
                })
                .await?;
            }
            Ok::<(), Cause<()>>(())
        });
        let taken = atomically(&cx, |tx| {
            let available = stock.read(tx)?;
            check(tx, available >= 5)?;
            stock.write(tx, available - 5);
            Ok::<_, StmError<()>>(available)
        })
        .await?;
        supplier.join(&cx).await?;
        Ok(taken)
    });
    fiberguard::assert_exit_ok!(exit, 6);
    fiberguard::test_complete!("check_waits_for_a_condition_set_by_another_fiber");
}
