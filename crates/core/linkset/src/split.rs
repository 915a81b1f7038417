//! `split` — release one `join` call's worth of association between two
//! references, fragmenting their shared lock if that was the only thing
//! still connecting them.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::error::LinkGraphError;
use crate::link::Link;
use crate::lock::LockInner;
use crate::locker::Locker;
use crate::reference::{Reference, Visited};

/// Breadth-first search over the link graph reachable from `start`,
/// restricted to whatever references currently share `start`'s lock.
/// Leaves every visited reference's scratch tag reset to `Unvisited`
/// before returning.
fn reachable_from(start: &Reference) -> Vec<Reference> {
    let mut queue = VecDeque::new();
    let mut component = Vec::new();

    start.set_visited(Visited::ToVisit);
    queue.push_back(start.clone());

    while let Some(r) = queue.pop_front() {
        if r.visited() == Visited::Visited {
            continue;
        }
        r.set_visited(Visited::Visited);
        component.push(r.clone());

        for l in r.links_a_mut().iter() {
            let (_, other) = l.endpoints();
            if other.visited() == Visited::Unvisited {
                other.set_visited(Visited::ToVisit);
                queue.push_back(other);
            }
        }
        for l in r.links_b_mut().iter() {
            let (other, _) = l.endpoints();
            if other.visited() == Visited::Unvisited {
                other.set_visited(Visited::ToVisit);
                queue.push_back(other);
            }
        }
    }

    for r in &component {
        r.set_visited(Visited::Unvisited);
    }
    component
}

/// Releases one `join` call's worth of association recorded by `link`.
///
/// If the link's refcount was above one, this only decrements it: the
/// references may still be linked some other way. If it reaches zero, the
/// link is detached and the group is re-examined; if removing it
/// disconnected the group into two components, the smaller piece is
/// migrated to a freshly minted `Lock` and added to `locker`'s held set.
///
/// # Panics (debug builds only)
///
/// Panics unless `locker` currently holds the lock shared by both of
/// `link`'s endpoints.
pub fn split(locker: &mut Locker, link: &Link) -> Result<(), LinkGraphError> {
    let (a, b) = link.endpoints();
    let lock = a.current_lock();
    debug_assert!(locker.holds(&lock), "split: locker does not hold link's lock");
    debug_assert_eq!(
        LockInner::addr(&lock),
        LockInner::addr(&b.current_lock()),
        "split: link endpoints are not co-located"
    );

    if link.release() > 0 {
        log::trace!("split: link refcount still positive, group stays together");
        return Ok(());
    }

    link.detach();

    let component = reachable_from(&a);
    // SAFETY: `lock` is held.
    let total = unsafe { lock.state_mut() }.refsets.len();

    if component.len() == total {
        log::trace!("split: group stays connected after detaching link");
        return Ok(());
    }

    log::debug!(
        "split: fragmenting group of {total} into {} and {}",
        component.len(),
        total - component.len()
    );

    let new_lock = LockInner::new_empty()?;

    // SAFETY: `lock` is held.
    unsafe { lock.state_mut() }
        .refsets
        .retain(|r| !component.iter().any(|c| Reference::ptr_eq(c, r)));

    for r in &component {
        r.retarget(&new_lock);
    }
    // SAFETY: `new_lock` was just allocated and is not yet reachable from
    // anywhere but this function and the references we just retargeted.
    unsafe { new_lock.state_mut() }.refsets = component;

    locker.adopt(new_lock);

    Ok(())
}
