//! Software transactional memory.
//!
//! Transactions are plain closures over a [`Txn`] log, run by
//! [`atomically`]. Reads record the version they saw and writes are
//! buffered, so an attempt that loses a race is thrown away whole and rerun
//! with no partial effects ever visible. Version conflicts are never reported
//! to the caller.
//!
//! | Operation | Behaviour |
//! |-----------|-----------|
//! | [`TVar::read`] / [`TVar::write`] | snapshot read, buffered write |
//! | [`Txn::retry`] / [`check`] | block until something read changes |
//! | [`or_else`] | fall back to a second branch when the first retries |
//! | [`StmError::Abort`] | fail with a user error, discarding writes |
//!
//! [`TArray`] keeps one variable per element so that disjoint indices never
//! conflict. [`TQueue`] is a FIFO whose `pop` blocks while empty.
//!
//! # Example
//!
//! ```ignore
//! let jobs: TQueue<Job> = TQueue::bounded(64);
//! let next = atomically(&cx, |tx| Ok::<_, StmError<()>>(jobs.pop(tx)?)).await?;
//! ```

mod atomically;
pub mod tarray;
pub mod tqueue;
pub mod tvar;
pub mod txn;

pub use atomically::atomically;
pub use tarray::TArray;
pub use tqueue::TQueue;
pub use tvar::TVar;
pub use txn::{Restart, StmError, Txn, check, or_else};
