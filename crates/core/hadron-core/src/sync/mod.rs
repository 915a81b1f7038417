//! Synchronization primitives for the kernel.
//!
//! Provides [`SpinLock`], suitable for use in `static` items and usable
//! before any allocator or scheduler is available.
//!
//! [`loom_compat`] is public so other crates building their own primitives
//! on top of `RacyCell`/raw atomics (rather than `SpinLock` itself) stay
//! loom-aware too, the same way `spinlock.rs` does internally.

mod spinlock;

pub mod loom_compat;

pub use spinlock::{SpinLock, SpinLockGuard};
