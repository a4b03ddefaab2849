//! Internal utilities.

pub(crate) mod catch_unwind;
pub mod det_rng;

pub use det_rng::DetRng;

use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
