//! The transaction log.
//!
//! Commits are ordered by a global version clock. An attempt records the
//! clock when it begins and refuses to read any variable committed after
//! that point, so it only ever sees a consistent snapshot. Writes are
//! buffered in the log and installed at commit, after the read set has been
//! revalidated under the commit lock.

use super::tvar::{Slot, TVar};
use crate::cx::Cx;
use crate::types::{Cancelled, TVarId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::poll_fn;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Poll, Waker};

/// Version of the most recent commit.
static CLOCK: AtomicU64 = AtomicU64::new(0);

/// Serialises commits. Held only while validating and installing writes.
static COMMIT: Mutex<()> = Mutex::new(());

/// Why the current attempt must start over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Restart {
    /// The transaction asked to wait until something it read changes.
    #[error("transaction is waiting for a read variable to change")]
    Retry,
    /// Another transaction committed to a variable this attempt read.
    #[error("transaction read a variable that changed concurrently")]
    Conflict,
}

/// Error type of a transaction body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StmError<E> {
    /// Start over. Never surfaced to the caller of
    /// [`atomically`](super::atomically).
    #[error(transparent)]
    Restart(#[from] Restart),
    /// Abandon the transaction, discarding its writes, and fail with `E`.
    #[error("transaction aborted")]
    Abort(E),
}

impl<E> StmError<E> {
    /// Shorthand for [`StmError::Abort`].
    pub fn abort(err: E) -> Self {
        Self::Abort(err)
    }
}

struct ReadEntry {
    slot: Arc<dyn Slot>,
    version: u64,
}

struct WriteEntry {
    id: TVarId,
    slot: Arc<dyn Slot>,
    value: Box<dyn Any + Send + Sync>,
}

/// A single transaction attempt.
///
/// Passed to the transaction body by [`atomically`](super::atomically).
pub struct Txn {
    start: u64,
    reads: HashMap<TVarId, ReadEntry>,
    writes: Vec<WriteEntry>,
    latest: HashMap<TVarId, usize>,
}

impl Txn {
    pub(crate) fn begin() -> Self {
        Self {
            start: CLOCK.load(Ordering::Acquire),
            reads: HashMap::new(),
            writes: Vec::new(),
            latest: HashMap::new(),
        }
    }

    /// Abandons the attempt and waits until a variable it has read is
    /// committed to, then runs the transaction again.
    ///
    /// # Errors
    ///
    /// Always returns [`Restart::Retry`].
    pub fn retry<T>(&self) -> Result<T, Restart> {
        Err(Restart::Retry)
    }

    /// Number of distinct variables read so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    /// Number of distinct variables written so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.latest.len()
    }

    pub(crate) fn read<T>(&mut self, tvar: &TVar<T>) -> Result<T, Restart>
    where
        T: Clone + Send + Sync + 'static,
    {
        let id = tvar.id();
        if let Some(value) = self
            .latest
            .get(&id)
            .and_then(|&index| self.writes.get(index))
            .and_then(|entry| entry.value.downcast_ref::<T>())
        {
            return Ok(value.clone());
        }
        let (value, version) = tvar.load();
        if version > self.start {
            return Err(Restart::Conflict);
        }
        self.reads.entry(id).or_insert_with(|| ReadEntry {
            slot: tvar.slot(),
            version,
        });
        Ok(value)
    }

    pub(crate) fn write<T>(&mut self, tvar: &TVar<T>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        let id = tvar.id();
        self.latest.insert(id, self.writes.len());
        self.writes.push(WriteEntry {
            id,
            slot: tvar.slot(),
            value: Box::new(value),
        });
    }

    /// Position in the write log, for [`rollback`](Self::rollback).
    pub(crate) fn mark(&self) -> usize {
        self.writes.len()
    }

    /// Discards writes made after `mark`. Reads are kept so a later wait
    /// still watches everything the attempt looked at.
    pub(crate) fn rollback(&mut self, mark: usize) {
        self.writes.truncate(mark);
        self.latest.clear();
        for (index, entry) in self.writes.iter().enumerate() {
            self.latest.insert(entry.id, index);
        }
    }

    /// Validates the read set and installs the writes.
    ///
    /// Returns false, installing nothing, if a variable read by this attempt
    /// has been committed to since.
    pub(crate) fn commit(mut self) -> bool {
        if self.latest.is_empty() {
            // Every read was checked against the start version already.
            return true;
        }
        let mut wake = Vec::new();
        {
            let _commit = COMMIT.lock();
            if self
                .reads
                .values()
                .any(|entry| entry.slot.version() != entry.version)
            {
                return false;
            }
            let version = CLOCK.load(Ordering::Acquire) + 1;
            let latest = std::mem::take(&mut self.latest);
            let mut writes: Vec<Option<WriteEntry>> = self.writes.drain(..).map(Some).collect();
            for index in latest.into_values() {
                if let Some(entry) = writes.get_mut(index).and_then(Option::take) {
                    entry.slot.publish(entry.value, version, &mut wake);
                }
            }
            CLOCK.store(version, Ordering::Release);
        }
        for waker in wake {
            waker.wake();
        }
        true
    }

    /// Waits until a variable in the read set is committed to, or until the
    /// caller is cancelled.
    ///
    /// With an empty read set only cancellation ends the wait.
    pub(crate) async fn await_change(&self, cx: &Cx) -> Result<(), Cancelled> {
        poll_fn(|task_cx| {
            for entry in self.reads.values() {
                entry.slot.watch(task_cx.waker());
            }
            if self
                .reads
                .values()
                .any(|entry| entry.slot.version() != entry.version)
            {
                return Poll::Ready(Ok(()));
            }
            cx.poll_cancel(task_cx)
                .map(|reason| Err(Cancelled::new(reason)))
        })
        .await
    }
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("start", &self.start)
            .field("reads", &self.reads.len())
            .field("writes", &self.latest.len())
            .finish()
    }
}

/// Runs `first`; if it calls [`Txn::retry`], undoes its writes and runs
/// `second` instead.
///
/// If both retry, the transaction waits on everything either branch read.
///
/// # Errors
///
/// Returns whatever the branch that ran last returned.
pub fn or_else<T, E>(
    tx: &mut Txn,
    first: impl FnOnce(&mut Txn) -> Result<T, StmError<E>>,
    second: impl FnOnce(&mut Txn) -> Result<T, StmError<E>>,
) -> Result<T, StmError<E>> {
    let mark = tx.mark();
    match first(tx) {
        Err(StmError::Restart(Restart::Retry)) => {
            tx.rollback(mark);
            second(tx)
        }
        other => other,
    }
}

/// Retries the transaction unless `condition` holds.
///
/// # Errors
///
/// Returns [`Restart::Retry`] when `condition` is false.
pub fn check(tx: &Txn, condition: bool) -> Result<(), Restart> {
    if condition { Ok(()) } else { tx.retry() }
}
