//! Synchronization primitives that compose with cancellation.
//!
//! - [`Semaphore`]: counting semaphore whose waits are cancellation points
//! - [`AtomicRef`]: shared value replaced by compare-and-swap
//!
//! Neither primitive holds a lock across a suspension point. Permits return
//! on drop, so a fiber that unwinds never leaks one.

mod atomic_ref;
mod semaphore;

pub use atomic_ref::AtomicRef;
pub use semaphore::{AcquireError, OwnedSemaphorePermit, Semaphore, SemaphorePermit, TryAcquireError};
