//! Composable repeat and retry policies.
//!
//! A [`Schedule`] is a pure decision function. It is fed one input per
//! execution of an action (the success value for [`repeat`], the failure for
//! [`retry`]) together with its own state, and answers with a [`Decision`]:
//! either continue after some delay with a new state, or stop. Every
//! decision carries an output, so callers can observe what the policy saw.
//!
//! State is replaced on every step, never mutated in place. Combinators
//! build their state structurally from the states of their parts, so two
//! schedules can be combined without knowing anything about each other.
//!
//! # Counting
//!
//! [`recurs(n)`](recurs) allows `n` executions in total, the first one
//! included. `repeat(recurs(3), action)` runs `action` three times and
//! `retry(recurs(3), action)` makes three attempts before re-raising the last
//! failure.
//!
//! # Example
//!
//! ```ignore
//! use fiberguard::schedule::{exponential, recurs, retry, Schedule};
//!
//! let policy = recurs(5)
//!     .zip_right(exponential(Duration::from_millis(10), 2.0))
//!     .capped(Duration::from_secs(1))
//!     .jittered(0x5eed);
//! let body = retry(&cx, &policy, || fetch(&cx)).await?;
//! ```

pub mod combine;
pub mod driver;
mod primitive;

pub use combine::{
    And, Capped, Collect, Delayed, Jittered, Map, Or, UntilInput, WhileInput, WhileOutput, ZipLeft,
    ZipRight,
};
pub use driver::{repeat, repeat_or_else, retry, retry_or_else};
pub use primitive::{
    Exponential, Fibonacci, Forever, Identity, Linear, Once, Recurs, Spaced, exponential,
    fibonacci, forever, identity, linear, once, recurs, spaced,
};

use std::time::Duration;

/// The answer a schedule gives after one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<S, O> {
    /// Run again after `delay`, continuing from `state`.
    Continue {
        /// State for the next step.
        state: S,
        /// Pause before the next execution.
        delay: Duration,
        /// Output observed at this step.
        output: O,
    },
    /// Stop with the final output.
    Done(O),
}

impl<S, O> Decision<S, O> {
    /// Returns true if the schedule stopped.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Returns the delay before the next execution, if there is one.
    #[must_use]
    pub const fn delay(&self) -> Option<Duration> {
        match self {
            Self::Continue { delay, .. } => Some(*delay),
            Self::Done(_) => None,
        }
    }

    /// Borrows the output.
    #[must_use]
    pub const fn output(&self) -> &O {
        match self {
            Self::Continue { output, .. } | Self::Done(output) => output,
        }
    }

    /// Consumes the decision and returns its output.
    pub fn into_output(self) -> O {
        match self {
            Self::Continue { output, .. } | Self::Done(output) => output,
        }
    }

    /// Maps the output.
    pub fn map_output<P>(self, f: impl FnOnce(O) -> P) -> Decision<S, P> {
        match self {
            Self::Continue {
                state,
                delay,
                output,
            } => Decision::Continue {
                state,
                delay,
                output: f(output),
            },
            Self::Done(output) => Decision::Done(f(output)),
        }
    }

    /// Maps the state of a continuing decision.
    pub fn map_state<T>(self, f: impl FnOnce(S) -> T) -> Decision<T, O> {
        match self {
            Self::Continue {
                state,
                delay,
                output,
            } => Decision::Continue {
                state: f(state),
                delay,
                output,
            },
            Self::Done(output) => Decision::Done(output),
        }
    }

    /// Maps the delay of a continuing decision.
    pub fn map_delay(self, f: impl FnOnce(Duration) -> Duration) -> Self {
        match self {
            Self::Continue {
                state,
                delay,
                output,
            } => Self::Continue {
                state,
                delay: f(delay),
                output,
            },
            done @ Self::Done(_) => done,
        }
    }
}

/// A policy deciding whether, and after how long, an action runs again.
///
/// Implementations must be pure: the same input and state always produce
/// the same decision. Randomness, as in [`Schedule::jittered`], lives in the
/// state.
pub trait Schedule {
    /// What the schedule observes after each execution.
    type Input;
    /// Accumulator threaded between steps.
    type State: Clone + Send;
    /// What the schedule reports at each step.
    type Output;

    /// State before the first execution.
    fn initial(&self) -> Self::State;

    /// Decides what happens after an execution that produced `input`.
    fn step(&self, input: &Self::Input, state: Self::State)
    -> Decision<Self::State, Self::Output>;

    /// Continues only while both schedules continue, waiting for the longer
    /// of the two delays.
    fn and<B>(self, other: B) -> And<Self, B>
    where
        Self: Sized,
        B: Schedule<Input = Self::Input>,
    {
        And::new(self, other)
    }

    /// Continues while either schedule continues, waiting for the shorter
    /// delay among those still going.
    fn or<B>(self, other: B) -> Or<Self, B>
    where
        Self: Sized,
        B: Schedule<Input = Self::Input>,
    {
        Or::new(self, other)
    }

    /// Like [`and`](Self::and), keeping only this schedule's output.
    fn zip_left<B>(self, other: B) -> ZipLeft<Self, B>
    where
        Self: Sized,
        B: Schedule<Input = Self::Input>,
    {
        ZipLeft::new(self, other)
    }

    /// Like [`and`](Self::and), keeping only the other schedule's output.
    fn zip_right<B>(self, other: B) -> ZipRight<Self, B>
    where
        Self: Sized,
        B: Schedule<Input = Self::Input>,
    {
        ZipRight::new(self, other)
    }

    /// Accumulates every output, in order, in a vector shared between the
    /// state and each decision.
    fn collect(self) -> Collect<Self>
    where
        Self: Sized,
        Self::Output: Clone + Send + Sync,
    {
        Collect::new(self)
    }

    /// Transforms the output.
    fn map<F, P>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Output) -> P,
    {
        Map::new(self, f)
    }

    /// Stops as soon as an input fails `pred`.
    fn while_input<P>(self, pred: P) -> WhileInput<Self, P>
    where
        Self: Sized,
        P: Fn(&Self::Input) -> bool,
    {
        WhileInput::new(self, pred)
    }

    /// Stops as soon as an input satisfies `pred`.
    fn until_input<P>(self, pred: P) -> UntilInput<Self, P>
    where
        Self: Sized,
        P: Fn(&Self::Input) -> bool,
    {
        UntilInput::new(self, pred)
    }

    /// Stops as soon as an output fails `pred`.
    fn while_output<P>(self, pred: P) -> WhileOutput<Self, P>
    where
        Self: Sized,
        P: Fn(&Self::Output) -> bool,
    {
        WhileOutput::new(self, pred)
    }

    /// Rewrites every delay with `f`.
    fn delayed<F>(self, f: F) -> Delayed<Self, F>
    where
        Self: Sized,
        F: Fn(Duration) -> Duration,
    {
        Delayed::new(self, f)
    }

    /// Caps every delay at `max`.
    fn capped(self, max: Duration) -> Capped<Self>
    where
        Self: Sized,
    {
        Capped::new(self, max)
    }

    /// Scales every delay by a factor drawn from `[0.5, 1.5)`.
    ///
    /// The generator is seeded with `seed` and carried in the state, so the
    /// same seed always yields the same delays.
    fn jittered(self, seed: u64) -> Jittered<Self>
    where
        Self: Sized,
    {
        Jittered::new(self, seed)
    }
}

/// Multiplies a duration by a float, saturating on overflow.
pub(crate) fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Decision, Schedule};
    use std::time::Duration;

    /// Steps `schedule` with the same input until it stops or `limit` steps
    /// have been taken, returning the delays it asked for.
    pub(crate) fn delays<S: Schedule>(schedule: &S, input: &S::Input, limit: usize) -> Vec<Duration> {
        let mut state = schedule.initial();
        let mut out = Vec::new();
        for _ in 0..limit {
            match schedule.step(input, state) {
                Decision::Continue {
                    state: next, delay, ..
                } => {
                    out.push(delay);
                    state = next;
                }
                Decision::Done(_) => break,
            }
        }
        out
    }

    /// Number of executions the schedule allows before stopping, capped at
    /// `limit`.
    pub(crate) fn executions<S: Schedule>(schedule: &S, input: &S::Input, limit: usize) -> usize {
        delays(schedule, input, limit).len() + 1
    }
}
