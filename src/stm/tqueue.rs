//! A FIFO queue for use inside transactions.

use super::tvar::TVar;
use super::txn::{Restart, Txn};
use std::collections::VecDeque;

/// A transactional FIFO queue, optionally bounded.
///
/// `pop` on an empty queue and `push` on a full one call [`Txn::retry`], so
/// under [`atomically`](super::atomically) they block until another
/// transaction changes the queue.
#[derive(Debug)]
pub struct TQueue<T> {
    items: TVar<VecDeque<T>>,
    capacity: Option<usize>,
}

impl<T: Clone + Send + Sync + 'static> TQueue<T> {
    /// Creates an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: TVar::new(VecDeque::new()),
            capacity: None,
        }
    }

    /// Creates a queue holding at most `capacity` items (at least one).
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: TVar::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    /// Appends `item`, retrying while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Restart::Retry`] when full, or a read conflict.
    pub fn push(&self, tx: &mut Txn, item: T) -> Result<(), Restart> {
        let mut items = self.items.read(tx)?;
        if self.capacity.is_some_and(|cap| items.len() >= cap) {
            return tx.retry();
        }
        items.push_back(item);
        self.items.write(tx, items);
        Ok(())
    }

    /// Removes the oldest item, retrying while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Restart::Retry`] when empty, or a read conflict.
    pub fn pop(&self, tx: &mut Txn) -> Result<T, Restart> {
        match self.try_pop(tx)? {
            Some(item) => Ok(item),
            None => tx.retry(),
        }
    }

    /// Removes the oldest item if there is one.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn try_pop(&self, tx: &mut Txn) -> Result<Option<T>, Restart> {
        let mut items = self.items.read(tx)?;
        let item = items.pop_front();
        if item.is_some() {
            self.items.write(tx, items);
        }
        Ok(item)
    }

    /// Returns the oldest item without removing it.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn peek(&self, tx: &mut Txn) -> Result<Option<T>, Restart> {
        Ok(self.items.read(tx)?.front().cloned())
    }

    /// Number of queued items.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn len(&self, tx: &mut Txn) -> Result<usize, Restart> {
        Ok(self.items.read(tx)?.len())
    }

    /// Returns true if nothing is queued.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn is_empty(&self, tx: &mut Txn) -> Result<bool, Restart> {
        Ok(self.items.read(tx)?.is_empty())
    }
}

impl<T: Clone + Send + Sync + 'static> Default for TQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TQueue<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            capacity: self.capacity,
        }
    }
}
