//! Cancellation signals and the parent/child signal tree.
//!
//! Every fiber owns a [`CancelSignal`]. A connected child's signal is linked
//! into its parent's child table, so a request on the parent reaches every
//! descendant. Finished children unlink themselves, which lets a parent wait
//! for its subtree to go quiet before it reports its own exit.
//!
//! Locking: a signal never holds its own lock while locking another signal,
//! except while linking a brand new child that nobody else can see yet.

use crate::tracing_compat::trace;
use crate::types::{CancelReason, CancelState};
use parking_lot::Mutex;
use slab::Slab;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

/// Cooperative stop request shared by a fiber and everyone who may cancel it.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    state: AtomicU8,
    shared: Mutex<SignalShared>,
}

struct SignalShared {
    reason: Option<CancelReason>,
    parent: Option<ParentLink>,
    children: Slab<Arc<SignalInner>>,
    cancel_wakers: SmallVec<[Waker; 2]>,
    quiesce_wakers: SmallVec<[Waker; 1]>,
}

struct ParentLink {
    parent: Weak<SignalInner>,
    slot: usize,
}

impl SignalInner {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(CancelState::Active as u8),
            shared: Mutex::new(SignalShared {
                reason: None,
                parent: None,
                children: Slab::new(),
                cancel_wakers: SmallVec::new(),
                quiesce_wakers: SmallVec::new(),
            }),
        }
    }

    fn state(&self) -> CancelState {
        CancelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn request(&self, reason: &CancelReason) -> bool {
        let (first, children, wakers) = {
            let mut shared = self.shared.lock();
            let first = match shared.reason.as_mut() {
                Some(current) => {
                    current.strengthen(reason);
                    false
                }
                None => {
                    shared.reason = Some(reason.clone());
                    let _ = self.state.compare_exchange(
                        CancelState::Active as u8,
                        CancelState::CancelRequested as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    true
                }
            };
            let children: SmallVec<[Arc<Self>; 4]> =
                shared.children.iter().map(|(_, c)| Arc::clone(c)).collect();
            let wakers = std::mem::take(&mut shared.cancel_wakers);
            (first, children, wakers)
        };

        for waker in wakers {
            waker.wake();
        }
        if !children.is_empty() {
            let inherited = CancelReason::parent_cancelled();
            for child in children {
                child.request(&inherited);
            }
        }
        first
    }
}

impl CancelSignal {
    /// Creates an unlinked signal.
    #[must_use]
    pub fn root() -> Self {
        Self {
            inner: Arc::new(SignalInner::new()),
        }
    }

    /// Creates a signal linked under `parent`.
    ///
    /// If the parent already has a pending request, the child starts with
    /// one too.
    #[must_use]
    pub fn child_of(parent: &Self) -> Self {
        let child = Arc::new(SignalInner::new());
        let parent_requested = {
            let mut shared = parent.inner.shared.lock();
            let slot = shared.children.insert(Arc::clone(&child));
            child.shared.lock().parent = Some(ParentLink {
                parent: Arc::downgrade(&parent.inner),
                slot,
            });
            shared.reason.is_some()
        };
        if parent_requested {
            child.request(&CancelReason::parent_cancelled());
        }
        Self { inner: child }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CancelState {
        self.inner.state()
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.state().is_requested()
    }

    /// Returns the strongest reason requested so far.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.shared.lock().reason.clone()
    }

    /// Requests cancellation and propagates it to every linked descendant.
    ///
    /// Idempotent: repeated requests only strengthen the recorded reason.
    /// Returns `true` for the request that moved the signal out of `Active`.
    pub fn request(&self, reason: CancelReason) -> bool {
        let first = self.inner.request(&reason);
        if first {
            trace!(reason = %reason, "cancel requested");
        }
        first
    }

    /// Requests cancellation of every linked child, leaving this signal alone.
    pub(crate) fn cancel_children(&self, reason: &CancelReason) {
        let children: SmallVec<[Arc<SignalInner>; 4]> = {
            let shared = self.inner.shared.lock();
            shared.children.iter().map(|(_, c)| Arc::clone(c)).collect()
        };
        for child in children {
            child.request(reason);
        }
    }

    /// Number of linked children that have not finished.
    #[must_use]
    pub fn live_children(&self) -> usize {
        self.inner.shared.lock().children.len()
    }

    /// Registers a waker to be woken when cancellation is requested.
    ///
    /// Returns `false` without registering if a request is already pending.
    pub(crate) fn register_waker(&self, waker: &Waker) -> bool {
        let mut shared = self.inner.shared.lock();
        if shared.reason.is_some() {
            return false;
        }
        if !shared.cancel_wakers.iter().any(|w| w.will_wake(waker)) {
            shared.cancel_wakers.push(waker.clone());
        }
        true
    }

    /// Polls until every linked child has finished.
    pub(crate) fn poll_quiescent(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut shared = self.inner.shared.lock();
        if shared.children.is_empty() {
            return Poll::Ready(());
        }
        if !shared.quiesce_wakers.iter().any(|w| w.will_wake(cx.waker())) {
            shared.quiesce_wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }

    /// Marks the owning fiber as finished and unlinks it from its parent.
    ///
    /// A pending request becomes `Cancelled`; an active signal stays active
    /// but can no longer reach descendants through the parent.
    pub(crate) fn finalize(&self) {
        let _ = self.inner.state.compare_exchange(
            CancelState::CancelRequested as u8,
            CancelState::Cancelled as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let (link, wakers) = {
            let mut shared = self.inner.shared.lock();
            let wakers = std::mem::take(&mut shared.cancel_wakers);
            (shared.parent.take(), wakers)
        };
        drop(wakers);

        let Some(link) = link else { return };
        let Some(parent) = link.parent.upgrade() else {
            return;
        };
        let wakers = {
            let mut shared = parent.shared.lock();
            if shared.children.contains(link.slot) {
                shared.children.remove(link.slot);
            }
            if shared.children.is_empty() {
                std::mem::take(&mut shared.quiesce_wakers)
            } else {
                SmallVec::new()
            }
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Returns true if both handles refer to the same signal.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("state", &self.state())
            .field("live_children", &self.live_children())
            .finish()
    }
}
