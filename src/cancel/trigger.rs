//! Externally owned cancellation handles.

use super::signal::CancelSignal;
use crate::types::CancelReason;

/// A cancellation source that is not tied to any fiber.
///
/// Fibers forked with [`fork_scoped`](crate::fiber::fork_scoped) link their
/// signal under the trigger instead of under their parent, so firing the
/// trigger cancels them while the parent keeps running.
#[derive(Clone, Debug)]
pub struct CancelTrigger {
    signal: CancelSignal,
}

impl CancelTrigger {
    /// Creates an armed trigger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: CancelSignal::root(),
        }
    }

    /// Fires the trigger with a user reason.
    pub fn cancel(&self) -> bool {
        self.cancel_with(CancelReason::user("trigger fired"))
    }

    /// Fires the trigger with the given reason.
    pub fn cancel_with(&self, reason: CancelReason) -> bool {
        self.signal.request(reason)
    }

    /// Returns true once the trigger has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancel_requested()
    }

    pub(crate) fn signal(&self) -> &CancelSignal {
        &self.signal
    }
}

impl Default for CancelTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firing_reaches_linked_signals() {
        let trigger = CancelTrigger::new();
        let linked = CancelSignal::child_of(trigger.signal());
        assert!(trigger.cancel());
        assert!(!trigger.cancel());
        assert!(trigger.is_cancelled());
        assert!(linked.is_cancel_requested());
    }
}
