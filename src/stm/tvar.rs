//! Transactional variables.

use super::txn::{Restart, Txn};
use crate::types::TVarId;
use core::fmt;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::any::Any;
use std::sync::Arc;
use std::task::Waker;

/// Type-erased view of a variable, as seen by the transaction log.
pub(crate) trait Slot: Send + Sync {
    fn id(&self) -> TVarId;

    /// Version of the last commit that wrote this variable.
    fn version(&self) -> u64;

    /// Installs a committed value and collects the wakers to notify.
    ///
    /// Must only be called while holding the commit lock.
    fn publish(&self, value: Box<dyn Any + Send + Sync>, version: u64, wake: &mut Vec<Waker>);

    /// Asks to be woken on the next commit that writes this variable.
    fn watch(&self, waker: &Waker);
}

struct Committed<T> {
    value: T,
    version: u64,
}

struct Core<T> {
    id: TVarId,
    committed: RwLock<Committed<T>>,
    watchers: Mutex<SmallVec<[Waker; 2]>>,
}

impl<T: Send + Sync + 'static> Slot for Core<T> {
    fn id(&self) -> TVarId {
        self.id
    }

    fn version(&self) -> u64 {
        self.committed.read().version
    }

    fn publish(&self, value: Box<dyn Any + Send + Sync>, version: u64, wake: &mut Vec<Waker>) {
        if let Ok(value) = value.downcast::<T>() {
            let mut committed = self.committed.write();
            committed.value = *value;
            committed.version = version;
        }
        wake.extend(self.watchers.lock().drain(..));
    }

    fn watch(&self, waker: &Waker) {
        let mut watchers = self.watchers.lock();
        if !watchers.iter().any(|w| w.will_wake(waker)) {
            watchers.push(waker.clone());
        }
    }
}

/// A shared variable that is read and written only inside transactions.
///
/// Cloning a `TVar` yields another handle to the same variable.
pub struct TVar<T> {
    core: Arc<Core<T>>,
}

impl<T: Clone + Send + Sync + 'static> TVar<T> {
    /// Creates a variable holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            core: Arc::new(Core {
                id: TVarId::next(),
                committed: RwLock::new(Committed { value, version: 0 }),
                watchers: Mutex::new(SmallVec::new()),
            }),
        }
    }

    /// Reads the value as of the transaction's snapshot.
    ///
    /// Sees the transaction's own earlier writes.
    ///
    /// # Errors
    ///
    /// Returns [`Restart::Conflict`] if another transaction committed to
    /// this variable after the current attempt began.
    pub fn read(&self, tx: &mut Txn) -> Result<T, Restart> {
        tx.read(self)
    }

    /// Buffers a write. Nothing is visible to others until commit.
    pub fn write(&self, tx: &mut Txn, value: T) {
        tx.write(self, value);
    }

    /// Replaces the value with `f(value)`.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn modify(&self, tx: &mut Txn, f: impl FnOnce(T) -> T) -> Result<(), Restart> {
        let value = self.read(tx)?;
        self.write(tx, f(value));
        Ok(())
    }

    /// Writes `value` and returns the previous one.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn swap(&self, tx: &mut Txn, value: T) -> Result<T, Restart> {
        let old = self.read(tx)?;
        self.write(tx, value);
        Ok(old)
    }

    /// Returns the last committed value, outside any transaction.
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.core.committed.read().value.clone()
    }

    pub(crate) fn load(&self) -> (T, u64) {
        let committed = self.core.committed.read();
        (committed.value.clone(), committed.version)
    }

    pub(crate) fn slot(&self) -> Arc<dyn Slot> {
        self.core.clone()
    }
}

impl<T> TVar<T> {
    /// Returns the variable's identifier.
    #[must_use]
    pub fn id(&self) -> TVarId {
        self.core.id
    }
}

impl<T> Clone for TVar<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let committed = self.core.committed.read();
        f.debug_struct("TVar")
            .field("id", &self.core.id)
            .field("value", &committed.value)
            .field("version", &committed.version)
            .finish()
    }
}
