//! [`Link`] — a symmetric, reference-counted association between two
//! [`Reference`]s that forces them to share a `Lock`.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use hadron_core::cell::RacyCell;

use crate::error::LinkGraphError;
use crate::reference::Reference;

pub(crate) enum LinkEndpoints {
    Linked(Reference, Reference),
    /// Set once either endpoint has been cleaned; the link body still
    /// exists (other clones of the `Link` handle may be draining) but no
    /// longer names live references.
    Orphaned,
}

struct LinkInner {
    refcnt: AtomicUsize,
    endpoints: RacyCell<LinkEndpoints>,
}

// SAFETY: `endpoints` is only read or written while the shared `Lock` of
// both endpoint references is held.
unsafe impl Send for LinkInner {}
unsafe impl Sync for LinkInner {}

/// A symmetric association between two [`Reference`]s, forcing `join` to
/// merge their `Lock`s and `split` to consider whether separating them
/// would fragment the group.
#[derive(Clone)]
pub struct Link(pub(crate) Arc<LinkInner>);

impl Link {
    /// Creates a fresh link with refcount 1. Does not register itself in
    /// either endpoint's `links_a`/`links_b`; the caller does that while
    /// already holding the shared lock.
    pub(crate) fn new_between(a: Reference, b: Reference) -> Result<Link, LinkGraphError> {
        let inner = Arc::try_new(LinkInner {
            refcnt: AtomicUsize::new(1),
            endpoints: RacyCell::new(LinkEndpoints::Linked(a, b)),
        })
        .map_err(|_| LinkGraphError::AllocFailure)?;
        Ok(Link(inner))
    }

    /// Adds one more `join` call's worth of sharing to an existing link.
    pub(crate) fn bump_refcnt(&self) {
        self.0.refcnt.fetch_add(1, Ordering::Relaxed);
    }

    /// Removes one `join` call's worth of sharing. Returns the refcount
    /// after the decrement; the caller detaches the link once this reaches
    /// zero.
    pub(crate) fn release(&self) -> usize {
        self.0.refcnt.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn refcnt(&self) -> usize {
        self.0.refcnt.load(Ordering::Acquire)
    }

    /// Returns clones of both endpoints.
    ///
    /// # Panics
    ///
    /// Panics if the link has already been orphaned.
    pub(crate) fn endpoints(&self) -> (Reference, Reference) {
        // SAFETY: caller holds the shared lock of both endpoints.
        match unsafe { &*self.0.endpoints.get() } {
            LinkEndpoints::Linked(a, b) => (a.clone(), b.clone()),
            LinkEndpoints::Orphaned => panic!("Link::endpoints called on an orphaned link"),
        }
    }

    pub(crate) fn ptr_eq(a: &Link, b: &Link) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Detaches this link from its B-endpoint and marks it orphaned.
    /// Called while draining a cleaned reference's `links_a`, so the
    /// A-endpoint's vector is already being dropped by the caller.
    pub(crate) fn orphan_from_a(&self) {
        // SAFETY: caller holds the shared lock of both endpoints.
        let endpoints = unsafe { &mut *self.0.endpoints.get() };
        if let LinkEndpoints::Linked(_, b) = endpoints {
            b.links_b_mut().retain(|l| !Link::ptr_eq(l, self));
        }
        *endpoints = LinkEndpoints::Orphaned;
    }

    /// Mirror of [`orphan_from_a`](Self::orphan_from_a) for the B-endpoint.
    pub(crate) fn orphan_from_b(&self) {
        // SAFETY: caller holds the shared lock of both endpoints.
        let endpoints = unsafe { &mut *self.0.endpoints.get() };
        if let LinkEndpoints::Linked(a, _) = endpoints {
            a.links_a_mut().retain(|l| !Link::ptr_eq(l, self));
        }
        *endpoints = LinkEndpoints::Orphaned;
    }

    /// Detaches this link from both endpoints' vectors and marks it
    /// orphaned. Used by `split`, where neither endpoint's vector has
    /// already been drained (contrast `orphan_from_a`/`orphan_from_b`,
    /// used by `Reference::clean`).
    pub(crate) fn detach(&self) {
        // SAFETY: caller holds the shared lock of both endpoints.
        let endpoints = unsafe { &mut *self.0.endpoints.get() };
        if let LinkEndpoints::Linked(a, b) = endpoints {
            a.links_a_mut().retain(|l| !Link::ptr_eq(l, self));
            b.links_b_mut().retain(|l| !Link::ptr_eq(l, self));
        }
        *endpoints = LinkEndpoints::Orphaned;
    }
}

impl core::fmt::Debug for Link {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Link({:p}, refcnt={})",
            Arc::as_ptr(&self.0),
            self.refcnt()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;

    #[test]
    fn new_link_starts_at_refcnt_one() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let link = Link::new_between(a, b).unwrap();
        assert_eq!(link.refcnt(), 1);
    }

    #[test]
    fn bump_and_release_track_refcnt() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let link = Link::new_between(a, b).unwrap();
        link.bump_refcnt();
        assert_eq!(link.refcnt(), 2);
        assert_eq!(link.release(), 1);
        assert_eq!(link.release(), 0);
    }

    #[test]
    fn endpoints_round_trip() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let link = Link::new_between(a.clone(), b.clone()).unwrap();
        let (x, y) = link.endpoints();
        assert!(Reference::ptr_eq(&x, &a));
        assert!(Reference::ptr_eq(&y, &b));
    }

    #[test]
    #[should_panic(expected = "orphaned")]
    fn endpoints_after_detach_panics() {
        let a = Reference::new().unwrap();
        let b = Reference::new().unwrap();
        let link = Link::new_between(a, b).unwrap();
        link.detach();
        link.endpoints();
    }
}
