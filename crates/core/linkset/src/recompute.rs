//! The process-wide recompute counter.
//!
//! Incremented once per [`Reference`](crate::Reference) whose `lock`
//! pointer is rewritten by [`join`](crate::join) or [`split`](crate::split).
//! It is the sole signal [`Locker`](crate::Locker) uses to know its cached
//! view of which [`Lock`](crate::lock::LockInner) each reference currently
//! belongs to might be stale.
//!
//! A single global counter is deliberately coarse: bumping it once per
//! merged/split reference (rather than once per `join`/`split` call) means
//! any `Locker` snapshot taken mid-merge is guaranteed to see a value that
//! will later compare unequal, so no Locker can observe a half-merged graph
//! as settled.

use core::sync::atomic::{AtomicUsize, Ordering};

static RECOMPUTE: AtomicUsize = AtomicUsize::new(0);

/// Returns the current recompute counter value.
#[inline]
pub(crate) fn current() -> usize {
    RECOMPUTE.load(Ordering::Acquire)
}

/// Bumps the recompute counter, signalling that some reference's lock
/// pointer just changed.
#[inline]
pub(crate) fn bump() {
    RECOMPUTE.fetch_add(1, Ordering::AcqRel);
}
