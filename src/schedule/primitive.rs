//! Primitive schedules.

use super::{Decision, Schedule, scale};
use std::marker::PhantomData;
use std::time::Duration;

/// Allows a fixed number of executions. See [`recurs`].
#[derive(Debug, Clone, Copy)]
pub struct Recurs<I> {
    times: u64,
    _input: PhantomData<fn(&I)>,
}

/// Allows `n` executions in total, the first one included.
///
/// `recurs(0)` behaves like `recurs(1)`: an action has to run once before
/// there is anything to decide on. Outputs the number of executions so far.
#[must_use]
pub fn recurs<I>(n: u64) -> Recurs<I> {
    Recurs {
        times: n.max(1),
        _input: PhantomData,
    }
}

impl<I> Schedule for Recurs<I> {
    type Input = I;
    type State = u64;
    type Output = u64;

    fn initial(&self) -> u64 {
        0
    }

    fn step(&self, _input: &I, state: u64) -> Decision<u64, u64> {
        let done = state.saturating_add(1);
        if done >= self.times {
            Decision::Done(done)
        } else {
            Decision::Continue {
                state: done,
                delay: Duration::ZERO,
                output: done,
            }
        }
    }
}

/// Never stops. See [`forever`].
#[derive(Debug, Clone, Copy)]
pub struct Forever<I> {
    _input: PhantomData<fn(&I)>,
}

/// Continues forever without pausing. Outputs the number of executions.
#[must_use]
pub fn forever<I>() -> Forever<I> {
    Forever {
        _input: PhantomData,
    }
}

impl<I> Schedule for Forever<I> {
    type Input = I;
    type State = u64;
    type Output = u64;

    fn initial(&self) -> u64 {
        0
    }

    fn step(&self, _input: &I, state: u64) -> Decision<u64, u64> {
        let done = state.saturating_add(1);
        Decision::Continue {
            state: done,
            delay: Duration::ZERO,
            output: done,
        }
    }
}

/// Fixed pause between executions. See [`spaced`].
#[derive(Debug, Clone, Copy)]
pub struct Spaced<I> {
    interval: Duration,
    _input: PhantomData<fn(&I)>,
}

/// Continues forever, pausing `interval` between executions.
#[must_use]
pub fn spaced<I>(interval: Duration) -> Spaced<I> {
    Spaced {
        interval,
        _input: PhantomData,
    }
}

impl<I> Schedule for Spaced<I> {
    type Input = I;
    type State = u64;
    type Output = u64;

    fn initial(&self) -> u64 {
        0
    }

    fn step(&self, _input: &I, state: u64) -> Decision<u64, u64> {
        let done = state.saturating_add(1);
        Decision::Continue {
            state: done,
            delay: self.interval,
            output: done,
        }
    }
}

/// Exponential backoff. See [`exponential`].
#[derive(Debug, Clone, Copy)]
pub struct Exponential<I> {
    base: Duration,
    factor: f64,
    _input: PhantomData<fn(&I)>,
}

/// Continues forever with delays `base * factor^k` for `k = 0, 1, 2, ...`.
///
/// `factor` is clamped to at least 1.0. Outputs the current delay.
#[must_use]
pub fn exponential<I>(base: Duration, factor: f64) -> Exponential<I> {
    Exponential {
        base,
        factor: factor.max(1.0),
        _input: PhantomData,
    }
}

impl<I> Schedule for Exponential<I> {
    type Input = I;
    type State = u32;
    type Output = Duration;

    fn initial(&self) -> u32 {
        0
    }

    #[allow(clippy::cast_possible_wrap)]
    fn step(&self, _input: &I, state: u32) -> Decision<u32, Duration> {
        let exponent = state.min(i32::MAX as u32) as i32;
        let delay = scale(self.base, self.factor.powi(exponent));
        Decision::Continue {
            state: state.saturating_add(1),
            delay,
            output: delay,
        }
    }
}

/// Fibonacci backoff. See [`fibonacci`].
#[derive(Debug, Clone, Copy)]
pub struct Fibonacci<I> {
    base: Duration,
    _input: PhantomData<fn(&I)>,
}

/// Continues forever with delays `base, base, 2*base, 3*base, 5*base, ...`.
#[must_use]
pub fn fibonacci<I>(base: Duration) -> Fibonacci<I> {
    Fibonacci {
        base,
        _input: PhantomData,
    }
}

impl<I> Schedule for Fibonacci<I> {
    type Input = I;
    type State = (Duration, Duration);
    type Output = Duration;

    fn initial(&self) -> (Duration, Duration) {
        (Duration::ZERO, self.base)
    }

    fn step(&self, _input: &I, (prev, current): (Duration, Duration)) -> Decision<(Duration, Duration), Duration> {
        Decision::Continue {
            state: (current, prev.saturating_add(current)),
            delay: current,
            output: current,
        }
    }
}

/// Linear backoff. See [`linear`].
#[derive(Debug, Clone, Copy)]
pub struct Linear<I> {
    base: Duration,
    _input: PhantomData<fn(&I)>,
}

/// Continues forever with delays `base, 2*base, 3*base, ...`.
#[must_use]
pub fn linear<I>(base: Duration) -> Linear<I> {
    Linear {
        base,
        _input: PhantomData,
    }
}

impl<I> Schedule for Linear<I> {
    type Input = I;
    type State = u32;
    type Output = Duration;

    fn initial(&self) -> u32 {
        0
    }

    fn step(&self, _input: &I, state: u32) -> Decision<u32, Duration> {
        let next = state.saturating_add(1);
        let delay = self.base.saturating_mul(next);
        Decision::Continue {
            state: next,
            delay,
            output: delay,
        }
    }
}

/// Echoes its input. See [`identity`].
#[derive(Debug, Clone, Copy)]
pub struct Identity<I> {
    _input: PhantomData<fn(&I)>,
}

/// Continues forever without pausing, outputting each input.
///
/// Useful as the right side of [`zip_right`](Schedule::zip_right) to report
/// the last value an action produced.
#[must_use]
pub fn identity<I: Clone>() -> Identity<I> {
    Identity {
        _input: PhantomData,
    }
}

impl<I: Clone> Schedule for Identity<I> {
    type Input = I;
    type State = ();
    type Output = I;

    fn initial(&self) {}

    fn step(&self, input: &I, (): ()) -> Decision<(), I> {
        Decision::Continue {
            state: (),
            delay: Duration::ZERO,
            output: input.clone(),
        }
    }
}

/// A single repetition. See [`once`].
#[derive(Debug, Clone, Copy)]
pub struct Once<I> {
    _input: PhantomData<fn(&I)>,
}

/// Allows exactly one more execution after the first.
#[must_use]
pub fn once<I>() -> Once<I> {
    Once {
        _input: PhantomData,
    }
}

impl<I> Schedule for Once<I> {
    type Input = I;
    type State = bool;
    type Output = ();

    fn initial(&self) -> bool {
        false
    }

    fn step(&self, _input: &I, used: bool) -> Decision<bool, ()> {
        if used {
            Decision::Done(())
        } else {
            Decision::Continue {
                state: true,
                delay: Duration::ZERO,
                output: (),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::testing::{delays, executions};
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn recurs_counts_total_executions() {
        init_test("recurs_counts_total_executions");
        for n in 1..6u64 {
            let runs = executions(&recurs::<()>(n), &(), 100);
            crate::assert_with_log!(runs as u64 == n, "executions", n, runs);
        }
        let zero = executions(&recurs::<()>(0), &(), 100);
        crate::assert_with_log!(zero == 1, "recurs(0)", 1, zero);
        crate::test_complete!("recurs_counts_total_executions");
    }

    #[test]
    fn recurs_outputs_count() {
        init_test("recurs_outputs_count");
        let schedule = recurs::<()>(2);
        let first = schedule.step(&(), schedule.initial());
        crate::assert_with_log!(*first.output() == 1, "first", 1, *first.output());
        let Decision::Continue { state, .. } = first else {
            panic!("recurs(2) stopped after one execution");
        };
        let second = schedule.step(&(), state);
        crate::assert_with_log!(second == Decision::Done(2), "second", "Done(2)", second);
        crate::test_complete!("recurs_outputs_count");
    }

    #[test]
    fn forever_and_spaced_never_stop() {
        init_test("forever_and_spaced_never_stop");
        let free = delays(&forever::<()>(), &(), 50);
        crate::assert_with_log!(free.len() == 50, "forever", 50, free.len());
        crate::assert_with_log!(free.iter().all(Duration::is_zero), "no pause", true, false);
        let spaced = delays(&spaced::<()>(ms(7)), &(), 5);
        crate::assert_with_log!(spaced == vec![ms(7); 5], "spaced", vec![ms(7); 5], spaced);
        crate::test_complete!("forever_and_spaced_never_stop");
    }

    #[test]
    fn exponential_grows_by_factor() {
        init_test("exponential_grows_by_factor");
        let got = delays(&exponential::<()>(ms(10), 2.0), &(), 5);
        let want = vec![ms(10), ms(20), ms(40), ms(80), ms(160)];
        crate::assert_with_log!(got == want, "exponential", want, got);
        let flat = delays(&exponential::<()>(ms(10), 0.5), &(), 3);
        crate::assert_with_log!(flat == vec![ms(10); 3], "clamped factor", vec![ms(10); 3], flat);
        crate::test_complete!("exponential_grows_by_factor");
    }

    #[test]
    fn fibonacci_and_linear_sequences() {
        init_test("fibonacci_and_linear_sequences");
        let fib = delays(&fibonacci::<()>(ms(1)), &(), 6);
        let want = vec![ms(1), ms(1), ms(2), ms(3), ms(5), ms(8)];
        crate::assert_with_log!(fib == want, "fibonacci", want, fib);
        let lin = delays(&linear::<()>(ms(3)), &(), 4);
        let want = vec![ms(3), ms(6), ms(9), ms(12)];
        crate::assert_with_log!(lin == want, "linear", want, lin);
        crate::test_complete!("fibonacci_and_linear_sequences");
    }

    #[test]
    fn identity_echoes_and_once_stops() {
        init_test("identity_echoes_and_once_stops");
        let echo = identity::<String>();
        let decision = echo.step(&"hello".to_string(), echo.initial());
        crate::assert_with_log!(decision.output() == "hello", "echo", "hello", decision.output());
        let runs = executions(&once::<()>(), &(), 10);
        crate::assert_with_log!(runs == 2, "once", 2, runs);
        crate::test_complete!("identity_echoes_and_once_stops");
    }
}
