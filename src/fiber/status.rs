//! Observable fiber lifecycle status.

use crate::types::{Cause, Exit};
use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle status of a fiber.
///
/// `Running` and `Suspended` alternate while the fiber is live; the other
/// three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiberStatus {
    /// Being polled by a worker, or queued to be polled.
    Running,
    /// Waiting on a suspension point.
    Suspended,
    /// Finished with a value.
    Completed,
    /// Finished by observing cancellation.
    Cancelled,
    /// Finished with a failure or a panic.
    Failed,
}

impl FiberStatus {
    /// Returns true for the three terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Terminal status for an exit.
    pub fn of_exit<T, E>(exit: &Exit<T, E>) -> Self {
        match exit {
            Ok(_) => Self::Completed,
            Err(Cause::Cancelled(_)) => Self::Cancelled,
            Err(_) => Self::Failed,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Suspended => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
            Self::Failed => 4,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Suspended,
            2 => Self::Completed,
            3 => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for FiberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Status shared between a task and its fiber handle.
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(FiberStatus::Running.as_u8()))
    }

    pub(crate) fn get(&self) -> FiberStatus {
        FiberStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves between `Running` and `Suspended`; terminal statuses stick.
    pub(crate) fn set_live(&self, status: FiberStatus) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (!FiberStatus::from_u8(current).is_terminal()).then_some(status.as_u8())
            });
    }

    pub(crate) fn finish(&self, status: FiberStatus) {
        self.0.store(status.as_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_is_sticky() {
        let cell = StatusCell::new();
        cell.set_live(FiberStatus::Suspended);
        assert_eq!(cell.get(), FiberStatus::Suspended);
        cell.finish(FiberStatus::Cancelled);
        cell.set_live(FiberStatus::Running);
        assert_eq!(cell.get(), FiberStatus::Cancelled);
    }

    #[test]
    fn exit_maps_to_terminal_status() {
        let failed: Exit<(), &str> = Err(Cause::Failure("x"));
        assert_eq!(FiberStatus::of_exit(&failed), FiberStatus::Failed);
        assert_eq!(FiberStatus::of_exit::<u8, ()>(&Ok(1)), FiberStatus::Completed);
    }
}
