//! A [`Lock`] is a mutex plus the set of [`Reference`]s currently sharing
//! it.
//!
//! Unlike [`Reference::spin`](crate::reference), which is only ever held
//! across a pointer read, a `Lock`'s mutex must stay held across a whole
//! `LockMany`/`Join`/`Split`/`UnlockMany` sequence — including the
//! allocation `Join` and `Split` may need to perform. That rules out the
//! RAII-guard `SpinLock` from `hadron-core` (its guard's lifetime is tied
//! to the borrow of `&self`, and a `Locker` needs to hold locks across
//! calls, not within one scope). Instead `LockInner` exposes a manual
//! `raw_lock`/`raw_unlock` pair — the same TTAS algorithm, without a tied
//! guard — mirroring the original C implementation's explicit
//! `epicsMutexMustLock`/`epicsMutexUnlock` pairing one-for-one.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hadron_core::cell::RacyCell;
use hadron_core::sync::loom_compat::{AtomicBool, Ordering};

use crate::error::LinkGraphError;
use crate::locker::LockerId;
use crate::reference::Reference;

/// The data a `Lock`'s mutex protects: the set of references sharing it,
/// and which `Locker` (if any) currently holds it.
pub(crate) struct LockState {
    pub(crate) refsets: Vec<Reference>,
    pub(crate) owner: Option<LockerId>,
}

/// Internal representation of a `Lock`. Always accessed through
/// `Arc<LockInner>`; the `Arc`'s strong count *is* the spec's `refcnt`.
pub(crate) struct LockInner {
    locked: AtomicBool,
    state: RacyCell<LockState>,
}

// SAFETY: `state` is only ever touched between a `raw_lock`/`raw_unlock`
// pair (or, in `Drop`, when the caller is provably the sole owner), which
// is exactly the externally-synchronized contract `RacyCell` documents.
unsafe impl Send for LockInner {}
unsafe impl Sync for LockInner {}

pub(crate) type LockHandle = Arc<LockInner>;

impl LockInner {
    /// Allocates a fresh, empty, unlocked `Lock` with strong count 1.
    pub(crate) fn new_empty() -> Result<LockHandle, LinkGraphError> {
        Arc::try_new(LockInner {
            locked: AtomicBool::new(false),
            state: RacyCell::new(LockState {
                refsets: Vec::new(),
                owner: None,
            }),
        })
        .map_err(|_| LinkGraphError::AllocFailure)
    }

    /// Spins until the mutex is acquired. Test-and-test-and-set, same
    /// algorithm as `hadron_core::sync::SpinLock`, without a tied guard.
    pub(crate) fn raw_lock(&self) {
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Releases the mutex. Must be called exactly once per successful
    /// `raw_lock`, and must happen before the caller's extra strong count
    /// on this `Lock` is dropped (dropping the last strong count while
    /// still "locked" would destroy the `Lock` with its flag set).
    pub(crate) fn raw_unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Returns a mutable view of the protected state.
    ///
    /// # Safety
    ///
    /// The caller must be holding this `Lock` (via `raw_lock`) or must be
    /// the sole owner of the last strong reference (e.g. during `Drop`).
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn state_mut(&self) -> &mut LockState {
        unsafe { &mut *self.state.get() }
    }

    /// The address used as this `Lock`'s sort key. Stable for the `Arc`'s
    /// lifetime because `Arc` never relocates its allocation.
    pub(crate) fn addr(handle: &LockHandle) -> usize {
        Arc::as_ptr(handle) as usize
    }

    /// The number of live strong references to this `Lock` — one per
    /// `Reference` currently pointing at it, one per `Locker` cache slot
    /// naming it, and one per `Locker.locked[]` entry holding it. This
    /// *is* the spec's `refcnt`; there is no separate hand-maintained
    /// counter to drift out of sync with it.
    pub(crate) fn strong_count(handle: &LockHandle) -> usize {
        Arc::strong_count(handle)
    }
}

impl Drop for LockInner {
    fn drop(&mut self) {
        // Sole owner at this point: no concurrent `raw_lock` is possible.
        let state = self.state.get_mut();
        debug_assert!(
            state.refsets.is_empty(),
            "Lock dropped with non-empty refsets"
        );
        debug_assert!(state.owner.is_none(), "Lock dropped while still owned");
    }
}
