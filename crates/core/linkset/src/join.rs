//! `join` — force two references to share a lock, creating or
//! strengthening the [`Link`] between them.

use crate::error::LinkGraphError;
use crate::link::Link;
use crate::lock::LockInner;
use crate::locker::Locker;
use crate::reference::Reference;

fn find_existing(a: &Reference, b: &Reference) -> Option<Link> {
    for l in a.links_a_mut().iter() {
        let (_, other) = l.endpoints();
        if Reference::ptr_eq(&other, b) {
            return Some(l.clone());
        }
    }
    for l in a.links_b_mut().iter() {
        let (other, _) = l.endpoints();
        if Reference::ptr_eq(&other, b) {
            return Some(l.clone());
        }
    }
    None
}

fn new_link(a: &Reference, b: &Reference) -> Result<Link, LinkGraphError> {
    let link = Link::new_between(a.clone(), b.clone())?;
    a.links_a_mut().push(link.clone());
    b.links_b_mut().push(link.clone());
    Ok(link)
}

/// Forces `a` and `b` to share a `Lock`, merging their groups if they
/// don't already, and returns the [`Link`] recording the association (a
/// fresh one, or the existing link between them with its refcount bumped).
///
/// # Panics (debug builds only)
///
/// Panics unless `locker` currently holds the locks backing both `a` and
/// `b` (i.e. both were passed to the `lock_many` that is still in effect).
pub fn join(locker: &mut Locker, a: &Reference, b: &Reference) -> Result<Link, LinkGraphError> {
    let lock_a = a.current_lock();
    let lock_b = b.current_lock();
    debug_assert!(locker.holds(&lock_a), "join: locker does not hold a's lock");
    debug_assert!(locker.holds(&lock_b), "join: locker does not hold b's lock");

    if LockInner::addr(&lock_a) == LockInner::addr(&lock_b) {
        if let Some(existing) = find_existing(a, b) {
            existing.bump_refcnt();
            log::trace!("join: {a:?} and {b:?} already share a lock, bumping existing link");
            return Ok(existing);
        }
        return new_link(a, b);
    }

    // SAFETY: both locks are held (asserted above).
    let (survivor, absorbed) = unsafe {
        let refs_a = lock_a.state_mut().refsets.len();
        let refs_b = lock_b.state_mut().refsets.len();
        if refs_a >= refs_b {
            (&lock_a, &lock_b)
        } else {
            (&lock_b, &lock_a)
        }
    };
    log::debug!(
        "join: merging lock of {} refs into lock of {}",
        // SAFETY: both locks are held.
        unsafe { absorbed.state_mut() }.refsets.len(),
        unsafe { survivor.state_mut() }.refsets.len()
    );

    // SAFETY: `absorbed` is held; nothing else can observe or mutate its
    // refset while we hold it.
    let migrating = core::mem::take(&mut unsafe { absorbed.state_mut() }.refsets);
    for r in migrating {
        r.retarget(survivor);
        // SAFETY: `survivor` is held.
        unsafe { survivor.state_mut() }.refsets.push(r);
    }

    new_link(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locker::Locker;

    #[test]
    fn join_merges_two_singleton_groups() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let mut locker = Locker::new(&[a.clone(), b.clone()]).unwrap();
        locker.lock_many();
        join(&mut locker, &a, &b).unwrap();
        assert_eq!(
            LockInner::addr(&a.current_lock()),
            LockInner::addr(&b.current_lock())
        );
        locker.unlock_many();
    }

    #[test]
    fn joining_already_linked_refs_bumps_refcnt() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let mut locker = Locker::new(&[a.clone(), b.clone()]).unwrap();
        locker.lock_many();
        let link1 = join(&mut locker, &a, &b).unwrap();
        let link2 = join(&mut locker, &a, &b).unwrap();
        assert!(Link::ptr_eq(&link1, &link2));
        assert_eq!(link1.refcnt(), 2);
        locker.unlock_many();
    }
}
