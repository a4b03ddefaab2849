//! Timers.
//!
//! [`TimerHeap`] is a min-heap of deadlines. [`TimerDriver`] owns one heap
//! and a dedicated thread that sleeps until the earliest deadline and wakes
//! the registered wakers. Sleeps hold a [`TimerKey`] and cancel it when they
//! finish or are dropped; stale heap entries are skipped by generation.

use crate::error::{Error, ErrorKind};
use crate::tracing_compat::{debug, trace};
use parking_lot::{Condvar, Mutex};
use slab::Slab;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::task::Waker;
use std::thread::JoinHandle;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct TimerEntry {
    deadline: Instant,
    slot: usize,
    generation: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of `(deadline, slot)` pairs ordered by deadline.
#[derive(Debug, Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn insert(&mut self, deadline: Instant, slot: usize, generation: u64) {
        self.heap.push(TimerEntry {
            deadline,
            slot,
            generation,
        });
    }

    pub(crate) fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops every entry whose deadline is `<= now`, as `(slot, generation)`.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Vec<(usize, u64)> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                expired.push((entry.slot, entry.generation));
            }
        }
        expired
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

/// Registration handle for one pending deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerKey {
    slot: usize,
    generation: u64,
}

struct TimerSlot {
    generation: u64,
    waker: Option<Waker>,
}

struct TimerState {
    heap: TimerHeap,
    slots: Slab<TimerSlot>,
    next_generation: u64,
}

struct TimerShared {
    state: Mutex<TimerState>,
    changed: Condvar,
    shutdown: AtomicBool,
}

/// Background thread that fires deadlines.
pub(crate) struct TimerDriver {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerDriver {
    pub(crate) fn start(thread_name: &str) -> Result<Self, Error> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                heap: TimerHeap::new(),
                slots: Slab::new(),
                next_generation: 0,
            }),
            changed: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let driver_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(thread_name.to_owned())
            .spawn(move || drive(&driver_shared))
            .map_err(|err| {
                Error::new(ErrorKind::ThreadSpawn)
                    .with_message(thread_name.to_owned())
                    .with_source(err)
            })?;
        debug!(thread = thread_name, "timer driver started");
        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Registers `waker` to be woken at `deadline`.
    pub(crate) fn register(&self, deadline: Instant, waker: &Waker) -> TimerKey {
        let mut state = self.shared.state.lock();
        let generation = state.next_generation;
        state.next_generation += 1;
        let slot = state.slots.insert(TimerSlot {
            generation,
            waker: Some(waker.clone()),
        });
        let earliest = state.heap.peek_deadline().is_none_or(|d| deadline < d);
        state.heap.insert(deadline, slot, generation);
        drop(state);
        if earliest {
            self.shared.changed.notify_one();
        }
        TimerKey { slot, generation }
    }

    /// Replaces the waker of a pending registration.
    pub(crate) fn update_waker(&self, key: TimerKey, waker: &Waker) {
        let mut state = self.shared.state.lock();
        let replaced = match state.slots.get_mut(key.slot) {
            Some(slot)
                if slot.generation == key.generation
                    && !slot.waker.as_ref().is_some_and(|w| w.will_wake(waker)) =>
            {
                slot.waker.replace(waker.clone())
            }
            _ => None,
        };
        drop(state);
        drop(replaced);
    }

    /// Releases a registration. Unknown or stale keys are ignored.
    pub(crate) fn cancel(&self, key: TimerKey) {
        let removed = {
            let mut state = self.shared.state.lock();
            if state
                .slots
                .get(key.slot)
                .is_some_and(|slot| slot.generation == key.generation)
            {
                Some(state.slots.remove(key.slot))
            } else {
                None
            }
        };
        // Wakers are dropped outside the lock: a waker may own the last
        // reference to a task whose drop cancels another timer.
        drop(removed);
    }

    /// Number of live registrations.
    pub(crate) fn pending(&self) -> usize {
        self.shared.state.lock().slots.len()
    }

    /// Stops the driver thread and forgets every registration.
    pub(crate) fn shutdown(&self) {
        if self.shared.shutdown.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        let slots = {
            let mut state = self.shared.state.lock();
            state.heap.clear();
            std::mem::take(&mut state.slots)
        };
        drop(slots);
        self.shared.changed.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            // The last runtime handle can be dropped by a waker on this thread.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
        debug!("timer driver stopped");
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drive(shared: &TimerShared) {
    let mut state = shared.state.lock();
    loop {
        if shared.shutdown.load(AtomicOrdering::Acquire) {
            break;
        }
        let now = Instant::now();
        let mut due = Vec::new();
        for (slot, generation) in state.heap.pop_expired(now) {
            if let Some(entry) = state.slots.get_mut(slot) {
                if entry.generation == generation {
                    if let Some(waker) = entry.waker.take() {
                        due.push(waker);
                    }
                }
            }
        }
        if !due.is_empty() {
            trace!(fired = due.len(), "timers fired");
            parking_lot::MutexGuard::unlocked(&mut state, || {
                for waker in due {
                    waker.wake();
                }
            });
            continue;
        }
        match state.heap.peek_deadline() {
            Some(deadline) => {
                let _ = shared.changed.wait_until(&mut state, deadline);
            }
            None => shared.changed.wait(&mut state),
        }
    }
}
