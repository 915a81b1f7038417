//! [`Locker`] — a single-threaded, reusable context for acquiring several
//! [`Reference`]s' locks at once in a deadlock-free order, plus the
//! single-reference [`lock_one`] entry point.

use alloc::vec::Vec;
use core::cell::Cell;
use core::marker::PhantomData;

use crate::error::LinkGraphError;
use crate::lock::{LockHandle, LockInner};
use crate::reference::{lock_one_raw, Reference};
use crate::recompute;

/// Identifies which `Locker` currently owns a `Lock`, so `join`/`split`
/// can assert they are only ever invoked on locks the caller actually
/// holds. Derived from the `Locker`'s own address; valid only while that
/// `Locker` has not moved since the identity was taken; see
/// [`Locker::id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LockerId(usize);

/// One entry of `Locker::slots` — a caller-supplied reference paired with
/// the last `Lock` observed for it. `None` is the "not yet resolved"
/// sentinel (the C original's null `lock` pointer).
struct Slot {
    reference: Reference,
    lock: Option<LockHandle>,
}

/// A reusable, single-threaded context for locking a set of references
/// together.
///
/// Mirrors the two-phase C API one-for-one: [`Locker::new`] is
/// `LockerAlloc` (builds and sorts the `refs[]` cache but acquires
/// nothing), and [`Locker::lock_many`] is `LockMany` (acquires the cached
/// set, re-resolving if the graph changed underneath it). The split
/// matters operationally: a caller may build the cache once and run many
/// `lock_many`/`unlock_many` cycles over it without re-allocating.
///
/// Not `Sync`: the acquisition protocol assumes a single thread drives it
/// from `lock_many` through to `unlock_many`.
pub struct Locker {
    slots: Vec<Slot>,
    locked: Vec<LockHandle>,
    recomp: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl Locker {
    /// Builds a Locker's cache over `refs` (`LockerAlloc`). Order is
    /// irrelevant and duplicates are permitted — both wash out the first
    /// time the cache is sorted, in [`lock_many`](Self::lock_many).
    /// Acquires nothing.
    pub fn new(refs: &[Reference]) -> Result<Locker, LinkGraphError> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(refs.len())
            .map_err(|_| LinkGraphError::AllocFailure)?;
        for r in refs {
            slots.push(Slot {
                reference: r.clone(),
                lock: None,
            });
        }

        let mut locker = Locker {
            slots,
            locked: Vec::new(),
            // Any value other than the current counter forces the first
            // `update_refs` call below to actually do work.
            recomp: recompute::current().wrapping_sub(1),
            _not_sync: PhantomData,
        };
        locker.update_refs(true);
        Ok(locker)
    }

    fn id(&self) -> LockerId {
        LockerId(core::ptr::from_ref(self) as usize)
    }

    /// `updateRefs`: resolves each slot's reference against its current
    /// lock, reporting (and, if `update`, applying and re-sorting) any
    /// change since the last snapshot. Returns whether anything changed.
    fn update_refs(&mut self, update: bool) -> bool {
        let current = recompute::current();
        if current == self.recomp {
            return false;
        }

        let mut changed = false;
        for slot in &mut self.slots {
            let observed = slot.reference.current_lock();
            let stale = match &slot.lock {
                Some(cached) => LockInner::addr(cached) != LockInner::addr(&observed),
                None => true,
            };
            if stale {
                changed = true;
                if update {
                    slot.lock = Some(observed);
                }
            }
        }

        if update {
            self.recomp = current;
            if changed {
                self.slots
                    .sort_unstable_by_key(|slot| slot.lock.as_ref().map_or(usize::MAX, LockInner::addr));
            }
        }
        changed
    }

    /// Iterates `slots` in sorted order, acquiring each distinct lock
    /// exactly once and recording it in `locked[]`.
    fn acquire_unique(&mut self) {
        let id = self.id();
        let mut prev: Option<usize> = None;
        for slot in &self.slots {
            let Some(lock) = &slot.lock else { continue };
            let addr = LockInner::addr(lock);
            if prev == Some(addr) {
                continue;
            }
            prev = Some(addr);

            lock.raw_lock();
            // SAFETY: just acquired above.
            let state = unsafe { lock.state_mut() };
            debug_assert!(state.owner.is_none(), "lock acquired while already owned");
            state.owner = Some(id);
            self.locked.push(lock.clone());
        }
    }

    fn release_all(&mut self) {
        let id = self.id();
        for lock in self.locked.iter().rev() {
            // SAFETY: we hold every lock in `self.locked`.
            let state = unsafe { lock.state_mut() };
            debug_assert_eq!(state.owner, Some(id), "unlock_many by non-owning Locker");
            state.owner = None;
            lock.raw_unlock();
        }
        self.locked.clear();
    }

    /// Acquires every distinct `Lock` currently backing this locker's
    /// cached reference set, in a fixed address order (`LockMany`).
    /// Re-resolves and retries whenever a concurrent `join`/`split`
    /// changes which lock a reference belongs to between resolution and
    /// acquisition. Infallible: the per-call work is pointer comparisons,
    /// spinning, and `Arc::clone`s, none of which allocate.
    ///
    /// # Panics
    ///
    /// Panics (debug builds) if this locker already holds locks from an
    /// earlier `lock_many` that hasn't been released with
    /// [`unlock_many`](Self::unlock_many).
    pub fn lock_many(&mut self) {
        debug_assert!(
            self.locked.is_empty(),
            "lock_many called while still holding a previous set"
        );

        loop {
            self.update_refs(true);
            self.acquire_unique();
            if !self.update_refs(false) {
                break;
            }
            log::trace!("lock_many: graph changed mid-acquire, retrying");
            self.release_all();
        }
    }

    /// Releases every lock acquired by the last [`lock_many`](Self::lock_many).
    /// The `refs[]` cache survives for a later `lock_many` call.
    pub fn unlock_many(&mut self) {
        self.release_all();
    }

    /// Returns the distinct locks currently held by this locker, in
    /// acquisition order. Used internally by `join`/`split` to validate
    /// that both sides of the operation are actually held.
    pub(crate) fn holds(&self, lock: &LockHandle) -> bool {
        self.locked
            .iter()
            .any(|l| LockInner::addr(l) == LockInner::addr(lock))
    }

    /// Adds a freshly minted lock to this locker's held set without
    /// spinning on it — valid only for a lock just allocated by `split`,
    /// which by construction no other thread can yet observe.
    pub(crate) fn adopt(&mut self, lock: LockHandle) {
        // SAFETY: `lock` was just allocated by `split` and is not yet
        // reachable from anywhere else.
        unsafe { lock.state_mut() }.owner = Some(self.id());
        self.locked.push(lock);
    }

    #[cfg(test)]
    fn slot_addrs(&self) -> Vec<Option<usize>> {
        self.slots
            .iter()
            .map(|slot| slot.lock.as_ref().map(LockInner::addr))
            .collect()
    }
}

impl Drop for Locker {
    fn drop(&mut self) {
        debug_assert!(
            self.locked.is_empty(),
            "Locker dropped while still holding locks; call unlock_many first"
        );
    }
}

/// RAII guard returned by [`lock_one`]; releases the lock on drop.
pub struct LockGuard<'a> {
    _reference: &'a Reference,
    lock: LockHandle,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.raw_unlock();
    }
}

/// Acquires the `Lock` currently backing a single reference, via the
/// check-lock-recheck protocol: resolve, acquire, and retry if the
/// reference's lock pointer changed out from under us before the
/// acquisition landed.
#[must_use]
pub fn lock_one(reference: &Reference) -> LockGuard<'_> {
    let lock = lock_one_raw(reference);
    LockGuard {
        _reference: reference,
        lock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_many_then_unlock_many_round_trips() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let mut locker = Locker::new(&[a.clone(), b.clone()]).unwrap();
        locker.lock_many();
        assert!(locker.holds(&a.current_lock()));
        assert!(locker.holds(&b.current_lock()));
        locker.unlock_many();
    }

    #[test]
    fn lock_one_releases_on_drop() {
        let r = Reference::new().unwrap();
        let lock = r.current_lock();
        {
            let _guard = lock_one(&r);
        }
        // If the guard failed to release, this would spin forever.
        lock.raw_lock();
        lock.raw_unlock();
    }

    #[test]
    #[should_panic(expected = "still holding locks")]
    fn dropping_a_locker_with_held_locks_panics() {
        let a = Reference::new().unwrap();
        let mut locker = Locker::new(core::slice::from_ref(&a)).unwrap();
        locker.lock_many();
        drop(locker);
    }

    #[test]
    fn new_sorts_by_lock_address_regardless_of_input_order() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();

        let forward = Locker::new(&[a.clone(), b.clone()]).unwrap();
        let reversed = Locker::new(&[b.clone(), a.clone()]).unwrap();

        assert_eq!(forward.slot_addrs(), reversed.slot_addrs());
    }

    #[test]
    fn lock_many_is_reusable_across_cycles() {
        let a = Reference::new().unwrap();
        let mut locker = Locker::new(core::slice::from_ref(&a)).unwrap();
        locker.lock_many();
        locker.unlock_many();
        locker.lock_many();
        assert!(locker.holds(&a.current_lock()));
        locker.unlock_many();
    }

    #[test]
    fn cache_goes_stale_after_an_external_join_then_heals_on_relock() {
        use crate::join::join;

        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();

        let mut locker = Locker::new(&[b.clone(), a.clone()]).unwrap();
        locker.lock_many();
        locker.unlock_many();

        // A second, independent Locker performs the join while the first
        // Locker's cache still reflects the pre-join world.
        let mut joiner = Locker::new(&[a.clone(), b.clone()]).unwrap();
        joiner.lock_many();
        join(&mut joiner, &a, &b).unwrap();
        joiner.unlock_many();

        let merged_addr = LockInner::addr(&a.current_lock());
        assert_eq!(merged_addr, LockInner::addr(&b.current_lock()));

        let stale = locker.slot_addrs();
        assert!(
            !stale.iter().all(|addr| *addr == Some(merged_addr)),
            "cache should still reflect the pre-join locks immediately after an external join"
        );

        locker.lock_many();
        let refreshed = locker.slot_addrs();
        assert!(refreshed.iter().all(|addr| *addr == Some(merged_addr)));
        locker.unlock_many();
    }
}
