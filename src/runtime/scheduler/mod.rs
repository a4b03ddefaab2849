//! Worker threads and their shared run queue.

mod global_queue;
mod worker;

pub(crate) use global_queue::GlobalQueue;
pub(crate) use worker::run_worker;
