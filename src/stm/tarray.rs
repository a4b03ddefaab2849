//! Fixed-size arrays of transactional variables.
//!
//! Every element is its own [`TVar`], so transactions that touch disjoint
//! indices never conflict with each other.

use super::tvar::TVar;
use super::txn::{Restart, Txn};

/// A fixed-length array with per-element conflict detection.
#[derive(Debug)]
pub struct TArray<T> {
    cells: Vec<TVar<T>>,
}

impl<T: Clone + Send + Sync + 'static> TArray<T> {
    /// Creates an array of `len` copies of `value`.
    #[must_use]
    pub fn new(len: usize, value: T) -> Self {
        Self {
            cells: (0..len).map(|_| TVar::new(value.clone())).collect(),
        }
    }

    /// Creates an array from existing values.
    #[must_use]
    pub fn from_vec(values: Vec<T>) -> Self {
        Self {
            cells: values.into_iter().map(TVar::new).collect(),
        }
    }

    /// Reads element `index`, or `None` if it is out of bounds.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn get(&self, tx: &mut Txn, index: usize) -> Result<Option<T>, Restart> {
        self.cells.get(index).map(|cell| cell.read(tx)).transpose()
    }

    /// Buffers a write to element `index`. Returns false if it is out of
    /// bounds.
    pub fn set(&self, tx: &mut Txn, index: usize, value: T) -> bool {
        match self.cells.get(index) {
            Some(cell) => {
                cell.write(tx, value);
                true
            }
            None => false,
        }
    }

    /// Replaces element `index` with `f(element)`. Returns false if it is
    /// out of bounds.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn transform(&self, tx: &mut Txn, index: usize, f: impl FnOnce(T) -> T) -> Result<bool, Restart> {
        match self.cells.get(index) {
            Some(cell) => cell.modify(tx, f).map(|()| true),
            None => Ok(false),
        }
    }

    /// Folds over every element in index order.
    ///
    /// Reads the whole array, so the transaction conflicts with any writer.
    ///
    /// # Errors
    ///
    /// Propagates read conflicts.
    pub fn fold<A>(&self, tx: &mut Txn, init: A, mut f: impl FnMut(A, T) -> A) -> Result<A, Restart> {
        let mut acc = init;
        for cell in &self.cells {
            acc = f(acc, cell.read(tx)?);
        }
        Ok(acc)
    }

    /// Committed values of every element, outside any transaction.
    ///
    /// Elements are read one by one, so the result may mix commits.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.cells.iter().map(TVar::snapshot).collect()
    }
}

impl<T> TArray<T> {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<T> Clone for TArray<T> {
    fn clone(&self) -> Self {
        Self {
            cells: self.cells.clone(),
        }
    }
}
