//! Core synchronization primitives for the Hadron kernel.
//!
//! This crate contains host-testable abstractions extracted from
//! `hadron-kernel`: the spin lock used in contexts where no scheduler is
//! available yet, plus the small set of helper types (`RacyCell`, the
//! debug-assertion macros) those primitives and their callers lean on.
//!
//! By living outside the kernel crate, these types can be tested with
//! `cargo test`, loom, and miri on the host without a kernel target.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod cell;
pub mod safety;
pub mod static_assert;
pub mod sync;
