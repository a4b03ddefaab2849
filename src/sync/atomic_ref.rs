//! A shared reference updated by compare-and-swap.
//!
//! Readers take an [`Arc`] snapshot. Writers install a new snapshot only if
//! the one they started from is still current, retrying otherwise. The
//! internal lock covers the pointer swap alone; user functions always run
//! outside it, so nothing is ever held across a suspension point or a
//! cancellation.

use crate::tracing_compat::trace;
use parking_lot::RwLock;
use std::sync::Arc;

struct Current<T> {
    value: Arc<T>,
    version: u64,
}

/// A shared value replaced atomically as a whole.
pub struct AtomicRef<T> {
    current: RwLock<Current<T>>,
}

impl<T> AtomicRef<T> {
    /// Creates a reference holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Current {
                value: Arc::new(value),
                version: 0,
            }),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.current.read().value)
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Replaces the value unconditionally and returns the previous snapshot.
    pub fn set(&self, value: T) -> Arc<T> {
        let mut current = self.current.write();
        current.version += 1;
        std::mem::replace(&mut current.value, Arc::new(value))
    }

    /// Installs `value` if `expected` is still the current snapshot.
    ///
    /// Snapshots compare by identity, not by value: a write that stores an
    /// equal value still invalidates older snapshots.
    pub fn compare_and_set(&self, expected: &Arc<T>, value: T) -> bool {
        self.swap_if_current(expected, Arc::new(value)).is_ok()
    }

    /// Applies `f` to the current value until the result is installed
    /// without interference, and returns the installed snapshot.
    ///
    /// `f` may run several times under contention.
    pub fn update(&self, f: impl Fn(&T) -> T) -> Arc<T> {
        self.install(|value| (f(value), ())).0
    }

    /// Like [`update`](Self::update), with `f` also returning a result that
    /// is handed back once its write wins.
    pub fn modify<B>(&self, f: impl Fn(&T) -> (T, B)) -> B {
        self.install(f).1
    }

    fn install<B>(&self, f: impl Fn(&T) -> (T, B)) -> (Arc<T>, B) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let seen = self.get();
            let (next, out) = f(&seen);
            let next = Arc::new(next);
            if self.swap_if_current(&seen, Arc::clone(&next)).is_ok() {
                if attempts > 1 {
                    trace!(attempts, "atomic ref update installed after contention");
                }
                return (next, out);
            }
        }
    }

    fn swap_if_current(&self, expected: &Arc<T>, next: Arc<T>) -> Result<(), Arc<T>> {
        let mut current = self.current.write();
        if Arc::ptr_eq(&current.value, expected) {
            current.value = next;
            current.version += 1;
            Ok(())
        } else {
            Err(next)
        }
    }
}

impl<T: Default> Default for AtomicRef<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for AtomicRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.read();
        f.debug_struct("AtomicRef")
            .field("value", &current.value)
            .field("version", &current.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn compare_and_set_requires_current_snapshot() {
        init_test("compare_and_set_requires_current_snapshot");
        let cell = AtomicRef::new(1u32);
        let stale = cell.get();
        let previous = cell.set(1);
        crate::assert_with_log!(*previous == 1, "previous", 1, *previous);
        let lost = cell.compare_and_set(&stale, 5);
        crate::assert_with_log!(!lost, "stale snapshot rejected", false, lost);
        let fresh = cell.get();
        let won = cell.compare_and_set(&fresh, 5);
        crate::assert_with_log!(won, "fresh snapshot accepted", true, won);
        crate::assert_with_log!(*cell.get() == 5, "value", 5, *cell.get());
        crate::assert_with_log!(cell.version() == 2, "version", 2, cell.version());
        crate::test_complete!("compare_and_set_requires_current_snapshot");
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        init_test("concurrent_updates_are_not_lost");
        let cell = Arc::new(AtomicRef::new(Vec::<u32>::new()));
        let handles: Vec<_> = (0..4u32)
            .map(|worker| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cell.update(|items| {
                            let mut next = items.clone();
                            next.push(worker * 1000 + i);
                            next
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }
        let len = cell.get().len();
        crate::assert_with_log!(len == 400, "every push kept", 400, len);
        crate::test_complete!("concurrent_updates_are_not_lost");
    }

    #[test]
    fn modify_returns_its_result() {
        init_test("modify_returns_its_result");
        let cell = AtomicRef::new(10i32);
        let old = cell.modify(|n| (n - 3, *n));
        crate::assert_with_log!(old == 10, "returned old", 10, old);
        crate::assert_with_log!(*cell.get() == 7, "stored new", 7, *cell.get());
        crate::test_complete!("modify_returns_its_result");
    }
}
