//! Schedule combinators.
//!
//! Each combinator owns its parts and builds its state out of theirs, so
//! composition never needs to look inside a schedule.

use super::{Decision, Schedule, scale};
use crate::util::DetRng;
use std::sync::Arc;
use std::time::Duration;

/// Both schedules must continue. See [`Schedule::and`].
#[derive(Debug, Clone, Copy)]
pub struct And<A, B> {
    left: A,
    right: B,
}

impl<A, B> And<A, B> {
    pub(crate) fn new(left: A, right: B) -> Self {
        Self { left, right }
    }
}

impl<A, B> Schedule for And<A, B>
where
    A: Schedule,
    B: Schedule<Input = A::Input>,
{
    type Input = A::Input;
    type State = (A::State, B::State);
    type Output = (A::Output, B::Output);

    fn initial(&self) -> Self::State {
        (self.left.initial(), self.right.initial())
    }

    fn step(&self, input: &A::Input, (left, right): Self::State) -> Decision<Self::State, Self::Output> {
        match (self.left.step(input, left), self.right.step(input, right)) {
            (
                Decision::Continue {
                    state: ls,
                    delay: ld,
                    output: lo,
                },
                Decision::Continue {
                    state: rs,
                    delay: rd,
                    output: ro,
                },
            ) => Decision::Continue {
                state: (ls, rs),
                delay: ld.max(rd),
                output: (lo, ro),
            },
            (left, right) => Decision::Done((left.into_output(), right.into_output())),
        }
    }
}

/// Either schedule may continue. See [`Schedule::or`].
#[derive(Debug, Clone, Copy)]
pub struct Or<A, B> {
    left: A,
    right: B,
}

impl<A, B> Or<A, B> {
    pub(crate) fn new(left: A, right: B) -> Self {
        Self { left, right }
    }
}

impl<A, B> Schedule for Or<A, B>
where
    A: Schedule,
    B: Schedule<Input = A::Input>,
{
    type Input = A::Input;
    type State = (A::State, B::State);
    type Output = (A::Output, B::Output);

    fn initial(&self) -> Self::State {
        (self.left.initial(), self.right.initial())
    }

    fn step(&self, input: &A::Input, (left, right): Self::State) -> Decision<Self::State, Self::Output> {
        // A side that stopped keeps its last state so it keeps answering Done.
        let (left_prev, right_prev) = (left.clone(), right.clone());
        match (self.left.step(input, left), self.right.step(input, right)) {
            (
                Decision::Continue {
                    state: ls,
                    delay: ld,
                    output: lo,
                },
                Decision::Continue {
                    state: rs,
                    delay: rd,
                    output: ro,
                },
            ) => Decision::Continue {
                state: (ls, rs),
                delay: ld.min(rd),
                output: (lo, ro),
            },
            (
                Decision::Continue {
                    state,
                    delay,
                    output,
                },
                Decision::Done(ro),
            ) => Decision::Continue {
                state: (state, right_prev),
                delay,
                output: (output, ro),
            },
            (
                Decision::Done(lo),
                Decision::Continue {
                    state,
                    delay,
                    output,
                },
            ) => Decision::Continue {
                state: (left_prev, state),
                delay,
                output: (lo, output),
            },
            (Decision::Done(lo), Decision::Done(ro)) => Decision::Done((lo, ro)),
        }
    }
}

/// [`And`] keeping the left output. See [`Schedule::zip_left`].
#[derive(Debug, Clone, Copy)]
pub struct ZipLeft<A, B> {
    inner: And<A, B>,
}

impl<A, B> ZipLeft<A, B> {
    pub(crate) fn new(left: A, right: B) -> Self {
        Self {
            inner: And::new(left, right),
        }
    }
}

impl<A, B> Schedule for ZipLeft<A, B>
where
    A: Schedule,
    B: Schedule<Input = A::Input>,
{
    type Input = A::Input;
    type State = (A::State, B::State);
    type Output = A::Output;

    fn initial(&self) -> Self::State {
        self.inner.initial()
    }

    fn step(&self, input: &A::Input, state: Self::State) -> Decision<Self::State, A::Output> {
        self.inner.step(input, state).map_output(|(left, _)| left)
    }
}

/// [`And`] keeping the right output. See [`Schedule::zip_right`].
#[derive(Debug, Clone, Copy)]
pub struct ZipRight<A, B> {
    inner: And<A, B>,
}

impl<A, B> ZipRight<A, B> {
    pub(crate) fn new(left: A, right: B) -> Self {
        Self {
            inner: And::new(left, right),
        }
    }
}

impl<A, B> Schedule for ZipRight<A, B>
where
    A: Schedule,
    B: Schedule<Input = A::Input>,
{
    type Input = A::Input;
    type State = (A::State, B::State);
    type Output = B::Output;

    fn initial(&self) -> Self::State {
        self.inner.initial()
    }

    fn step(&self, input: &A::Input, state: Self::State) -> Decision<Self::State, B::Output> {
        self.inner.step(input, state).map_output(|(_, right)| right)
    }
}

/// Accumulates outputs. See [`Schedule::collect`].
///
/// Every decision hands out the same shared vector as the state keeps. A
/// step appends in place once the caller has let go of the previous output;
/// while that output is still held, the append copies.
#[derive(Debug, Clone, Copy)]
pub struct Collect<S> {
    inner: S,
}

impl<S> Collect<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> Schedule for Collect<S>
where
    S: Schedule,
    S::Output: Clone + Send + Sync,
{
    type Input = S::Input;
    type State = (S::State, Arc<Vec<S::Output>>);
    type Output = Arc<Vec<S::Output>>;

    fn initial(&self) -> Self::State {
        (self.inner.initial(), Arc::new(Vec::new()))
    }

    fn step(&self, input: &S::Input, (state, mut seen): Self::State) -> Decision<Self::State, Self::Output> {
        match self.inner.step(input, state) {
            Decision::Continue {
                state,
                delay,
                output,
            } => {
                Arc::make_mut(&mut seen).push(output);
                Decision::Continue {
                    output: Arc::clone(&seen),
                    state: (state, seen),
                    delay,
                }
            }
            Decision::Done(output) => {
                Arc::make_mut(&mut seen).push(output);
                Decision::Done(seen)
            }
        }
    }
}

/// Transforms outputs. See [`Schedule::map`].
#[derive(Debug, Clone, Copy)]
pub struct Map<S, F> {
    inner: S,
    f: F,
}

impl<S, F> Map<S, F> {
    pub(crate) fn new(inner: S, f: F) -> Self {
        Self { inner, f }
    }
}

impl<S, F, P> Schedule for Map<S, F>
where
    S: Schedule,
    F: Fn(S::Output) -> P,
{
    type Input = S::Input;
    type State = S::State;
    type Output = P;

    fn initial(&self) -> S::State {
        self.inner.initial()
    }

    fn step(&self, input: &S::Input, state: S::State) -> Decision<S::State, P> {
        self.inner.step(input, state).map_output(&self.f)
    }
}

/// Stops once an input fails a predicate. See [`Schedule::while_input`].
#[derive(Debug, Clone, Copy)]
pub struct WhileInput<S, P> {
    inner: S,
    pred: P,
}

impl<S, P> WhileInput<S, P> {
    pub(crate) fn new(inner: S, pred: P) -> Self {
        Self { inner, pred }
    }
}

impl<S, P> Schedule for WhileInput<S, P>
where
    S: Schedule,
    P: Fn(&S::Input) -> bool,
{
    type Input = S::Input;
    type State = S::State;
    type Output = S::Output;

    fn initial(&self) -> S::State {
        self.inner.initial()
    }

    fn step(&self, input: &S::Input, state: S::State) -> Decision<S::State, S::Output> {
        let decision = self.inner.step(input, state);
        if (self.pred)(input) {
            decision
        } else {
            Decision::Done(decision.into_output())
        }
    }
}

/// Stops once an input satisfies a predicate. See [`Schedule::until_input`].
#[derive(Debug, Clone, Copy)]
pub struct UntilInput<S, P> {
    inner: S,
    pred: P,
}

impl<S, P> UntilInput<S, P> {
    pub(crate) fn new(inner: S, pred: P) -> Self {
        Self { inner, pred }
    }
}

impl<S, P> Schedule for UntilInput<S, P>
where
    S: Schedule,
    P: Fn(&S::Input) -> bool,
{
    type Input = S::Input;
    type State = S::State;
    type Output = S::Output;

    fn initial(&self) -> S::State {
        self.inner.initial()
    }

    fn step(&self, input: &S::Input, state: S::State) -> Decision<S::State, S::Output> {
        let decision = self.inner.step(input, state);
        if (self.pred)(input) {
            Decision::Done(decision.into_output())
        } else {
            decision
        }
    }
}

/// Stops once an output fails a predicate. See [`Schedule::while_output`].
#[derive(Debug, Clone, Copy)]
pub struct WhileOutput<S, P> {
    inner: S,
    pred: P,
}

impl<S, P> WhileOutput<S, P> {
    pub(crate) fn new(inner: S, pred: P) -> Self {
        Self { inner, pred }
    }
}

impl<S, P> Schedule for WhileOutput<S, P>
where
    S: Schedule,
    P: Fn(&S::Output) -> bool,
{
    type Input = S::Input;
    type State = S::State;
    type Output = S::Output;

    fn initial(&self) -> S::State {
        self.inner.initial()
    }

    fn step(&self, input: &S::Input, state: S::State) -> Decision<S::State, S::Output> {
        let decision = self.inner.step(input, state);
        if (self.pred)(decision.output()) {
            decision
        } else {
            Decision::Done(decision.into_output())
        }
    }
}

/// Rewrites delays. See [`Schedule::delayed`].
#[derive(Debug, Clone, Copy)]
pub struct Delayed<S, F> {
    inner: S,
    f: F,
}

impl<S, F> Delayed<S, F> {
    pub(crate) fn new(inner: S, f: F) -> Self {
        Self { inner, f }
    }
}

impl<S, F> Schedule for Delayed<S, F>
where
    S: Schedule,
    F: Fn(Duration) -> Duration,
{
    type Input = S::Input;
    type State = S::State;
    type Output = S::Output;

    fn initial(&self) -> S::State {
        self.inner.initial()
    }

    fn step(&self, input: &S::Input, state: S::State) -> Decision<S::State, S::Output> {
        self.inner.step(input, state).map_delay(&self.f)
    }
}

/// Caps delays. See [`Schedule::capped`].
#[derive(Debug, Clone, Copy)]
pub struct Capped<S> {
    inner: S,
    max: Duration,
}

impl<S> Capped<S> {
    pub(crate) fn new(inner: S, max: Duration) -> Self {
        Self { inner, max }
    }
}

impl<S: Schedule> Schedule for Capped<S> {
    type Input = S::Input;
    type State = S::State;
    type Output = S::Output;

    fn initial(&self) -> S::State {
        self.inner.initial()
    }

    fn step(&self, input: &S::Input, state: S::State) -> Decision<S::State, S::Output> {
        self.inner
            .step(input, state)
            .map_delay(|delay| delay.min(self.max))
    }
}

/// Randomises delays deterministically. See [`Schedule::jittered`].
#[derive(Debug, Clone, Copy)]
pub struct Jittered<S> {
    inner: S,
    seed: u64,
}

impl<S> Jittered<S> {
    pub(crate) fn new(inner: S, seed: u64) -> Self {
        Self { inner, seed }
    }
}

impl<S: Schedule> Schedule for Jittered<S> {
    type Input = S::Input;
    type State = (S::State, DetRng);
    type Output = S::Output;

    fn initial(&self) -> Self::State {
        (self.inner.initial(), DetRng::new(self.seed))
    }

    fn step(&self, input: &S::Input, (state, mut rng): Self::State) -> Decision<Self::State, S::Output> {
        self.inner
            .step(input, state)
            .map_delay(|delay| scale(delay, 0.5 + rng.next_unit()))
            .map_state(|state| (state, rng))
    }
}
