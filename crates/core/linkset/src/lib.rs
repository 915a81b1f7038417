//! A dynamic lock-grouping engine.
//!
//! References are individually-lockable identities ([`Reference`]). A
//! [`Link`] forces two references to share a `Lock`, merging their groups;
//! [`split`] releases that association and, if nothing else keeps the
//! group together, un-merges it again. [`Locker`] acquires several
//! references' locks at once, in a fixed order, so no combination of
//! concurrent callers can deadlock against each other.
//!
//! This mirrors the locking model EPICS databases use to let record
//! processing safely group arbitrarily many records under one lock: any
//! record can be locked on its own, records can be forced to share a lock
//! (e.g. because a chain of links connects them), and the grouping is
//! maintained automatically as those links come and go.
#![cfg_attr(not(test), no_std)]
#![feature(allocator_api)]
#![warn(missing_docs)]

extern crate alloc;

mod join;
mod lock;
mod locker;
mod recompute;
mod split;

pub mod error;
pub mod link;
pub mod reference;

pub use error::LinkGraphError;
pub use join::join;
pub use link::Link;
pub use locker::{lock_one, LockGuard, Locker};
pub use reference::Reference;
pub use split::split;
