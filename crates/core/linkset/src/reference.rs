//! [`Reference`] — a long-lived, individually-lockable identity.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hadron_core::cell::RacyCell;
use hadron_core::sync::SpinLock;

use crate::error::LinkGraphError;
use crate::link::Link;
use crate::lock::{LockHandle, LockInner};

/// Scratch tag used only during `split`'s breadth-first search. Mirrors the
/// original C implementation's `0`/`1`/`2` `visited` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visited {
    /// Not yet touched by the current search (the steady-state value).
    Unvisited,
    /// Queued, not yet expanded.
    ToVisit,
    /// Expanded.
    Visited,
}

struct RefInner {
    /// Guards reads/writes of which `Lock` this reference currently
    /// belongs to. Always a short critical section (a pointer read, or a
    /// pointer write plus one atomic increment), so the RAII `SpinLock`
    /// from `hadron-core` is the right tool here (contrast `Lock`'s own
    /// mutex, which must stay held across whole API calls).
    lock: SpinLock<LockHandle>,

    /// Links where this reference is the A-endpoint. Guarded by the
    /// mutex of whatever `Lock` this reference currently belongs to — not
    /// by `lock` above, and not by any mutex of its own, which is exactly
    /// the "externally synchronized" contract `RacyCell` exists for.
    links_a: RacyCell<Vec<Link>>,
    /// Links where this reference is the B-endpoint. Same guard as
    /// `links_a`.
    links_b: RacyCell<Vec<Link>>,
    /// Split's scratch BFS tag. Same guard as `links_a`.
    visited: RacyCell<Visited>,
}

// SAFETY: `links_a`/`links_b`/`visited` are only touched while the
// reference's current `Lock` is held (see field docs above).
unsafe impl Send for RefInner {}
unsafe impl Sync for RefInner {}

/// A long-lived, individually-lockable identity.
///
/// Cheap to clone (an `Arc` bump); every clone refers to the same
/// underlying identity and always observes the same current `Lock`.
#[derive(Clone)]
pub struct Reference(pub(crate) Arc<RefInner>);

impl Reference {
    /// Creates a fresh `Reference`, the sole member of a brand-new `Lock`.
    pub fn new() -> Result<Reference, LinkGraphError> {
        let lock = LockInner::new_empty()?;
        let inner = Arc::try_new(RefInner {
            lock: SpinLock::new(lock.clone()),
            links_a: RacyCell::new(Vec::new()),
            links_b: RacyCell::new(Vec::new()),
            visited: RacyCell::new(Visited::Unvisited),
        })
        .map_err(|_| LinkGraphError::AllocFailure)?;
        let reference = Reference(inner);

        lock.raw_lock();
        // SAFETY: we hold `lock` via raw_lock above.
        unsafe { lock.state_mut() }.refsets.push(reference.clone());
        lock.raw_unlock();

        Ok(reference)
    }

    /// Finalizes this reference: removes it from its current `Lock`'s
    /// refsets and orphans every link it participates in.
    ///
    /// # Panics (debug builds only)
    ///
    /// Panics if this reference is still cached by a live [`Locker`](crate::Locker).
    /// There is no portable way to check this cheaply at runtime, so in
    /// release builds violating the precondition is simply undefined
    /// behavior from the engine's point of view (a `Locker` would be left
    /// holding a dangling cache entry).
    pub fn clean(self) {
        let lock = lock_one_raw(&self);

        // SAFETY: `lock` is held via `raw_lock` inside `lock_one_raw`.
        let state = unsafe { lock.state_mut() };
        state.refsets.retain(|r| !Arc::ptr_eq(&r.0, &self.0));

        // SAFETY: `self.0.links_a`/`links_b` are guarded by `lock`, which
        // we hold.
        let links_a = unsafe { &mut *self.0.links_a.get() };
        for link in links_a.drain(..) {
            link.orphan_from_a();
        }
        let links_b = unsafe { &mut *self.0.links_b.get() };
        for link in links_b.drain(..) {
            link.orphan_from_b();
        }

        lock.raw_unlock();
        drop(lock);
    }

    /// Returns the `Lock` this reference currently belongs to.
    pub(crate) fn current_lock(&self) -> LockHandle {
        self.0.lock.lock().clone()
    }

    /// The current strong-reference count on the `Lock` this reference
    /// belongs to — one per `Reference` pointing at it, one per `Locker`
    /// cache slot naming it, one per `Locker.locked[]` entry holding it.
    /// Exposed for tests asserting the quantified invariants directly;
    /// not meant to drive production logic (the count changes the moment
    /// another thread touches the graph). Reads through the spin-lock
    /// guard directly rather than via `current_lock()`, which would clone
    /// the handle and inflate the count it's trying to measure by one.
    #[must_use]
    pub fn lock_strong_count(&self) -> usize {
        let guard = self.0.lock.lock();
        LockInner::strong_count(&guard)
    }

    /// True if `a` and `b` currently belong to the same `Lock`.
    #[must_use]
    pub fn shares_lock(a: &Reference, b: &Reference) -> bool {
        LockInner::addr(&a.current_lock()) == LockInner::addr(&b.current_lock())
    }

    /// Rewrites which `Lock` this reference belongs to. Bumps the global
    /// recompute counter so any `Locker` that might have cached the old
    /// value notices.
    pub(crate) fn retarget(&self, new_lock: &LockHandle) {
        let mut guard = self.0.lock.lock();
        *guard = new_lock.clone();
        drop(guard);
        crate::recompute::bump();
    }

    pub(crate) fn links_a_mut(&self) -> &mut Vec<Link> {
        // SAFETY: caller holds this reference's current `Lock`.
        unsafe { &mut *self.0.links_a.get() }
    }

    pub(crate) fn links_b_mut(&self) -> &mut Vec<Link> {
        // SAFETY: caller holds this reference's current `Lock`.
        unsafe { &mut *self.0.links_b.get() }
    }

    pub(crate) fn set_visited(&self, v: Visited) {
        // SAFETY: caller holds this reference's current `Lock`.
        unsafe { *self.0.visited.get() = v };
    }

    pub(crate) fn visited(&self) -> Visited {
        // SAFETY: caller holds this reference's current `Lock`.
        unsafe { *self.0.visited.get() }
    }

    /// Identity comparison: do these two handles refer to the same
    /// reference?
    pub fn ptr_eq(a: &Reference, b: &Reference) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl core::fmt::Debug for Reference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Reference({:p})", Arc::as_ptr(&self.0))
    }
}

/// The check-lock-recheck protocol (`LockOne`'s core), returning the held
/// `Lock` without a tied guard — used internally by `Reference::clean` and
/// wrapped by the public `lock_one`.
pub(crate) fn lock_one_raw(r: &Reference) -> LockHandle {
    let mut attempt: u32 = 0;
    loop {
        let l = r.current_lock();
        l.raw_lock();
        let l2 = r.current_lock();
        if !Arc::ptr_eq(&l, &l2) {
            l.raw_unlock();
            drop(l);
            attempt += 1;
            if attempt <= 8 || attempt.is_power_of_two() {
                log::trace!(
                    "lock_one retry #{attempt} on {r:?}: lock pointer changed mid-acquire"
                );
            }
            continue;
        }
        return l;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_reference_is_sole_member_of_its_lock() {
        let r = Reference::new().unwrap();
        let lock = r.current_lock();
        // SAFETY: no one else can be touching this brand-new lock.
        let state = unsafe { lock.state_mut() };
        assert_eq!(state.refsets.len(), 1);
        assert!(Reference::ptr_eq(&state.refsets[0], &r));
    }

    #[test]
    fn clone_shares_identity() {
        let a = Reference::new().unwrap();
        let b = a.clone();
        assert!(Reference::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_references_are_not_equal() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        assert!(!Reference::ptr_eq(&a, &b));
    }

    #[test]
    fn clean_empties_the_lock() {
        let r = Reference::new().unwrap();
        let lock = r.current_lock();
        r.clean();
        // SAFETY: sole owner now that the only reference is cleaned.
        let state = unsafe { lock.state_mut() };
        assert!(state.refsets.is_empty());
    }

    #[test]
    fn lock_one_raw_returns_current_lock() {
        let r = Reference::new().unwrap();
        let expected = r.current_lock();
        let held = lock_one_raw(&r);
        assert_eq!(LockInner::addr(&held), LockInner::addr(&expected));
        held.raw_unlock();
    }
}
