//! The engine's error type.
//!
//! The lock-grouping engine recognizes exactly one recoverable error:
//! allocation failure. Everything else the spec calls an
//! "InvariantViolation" (a non-empty locked set at `Locker` drop, an owner
//! mismatch at `unlock_many`, a refcount that underflows) is a caller bug
//! or internal corruption, and is raised as a `debug_assert!`/`assert!`
//! panic rather than returned — there is nothing a caller could usefully
//! do to recover from a corrupted lock graph.

use core::fmt;

/// Errors returned by the fallible entry points of the lock-grouping engine.
///
/// Every fallible operation here leaves the graph exactly as it was before
/// the call on `Err` — callers may propagate this with `?` without worrying
/// about partial mutation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkGraphError {
    /// A heap allocation needed to complete the operation failed.
    AllocFailure,
}

impl fmt::Display for LinkGraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkGraphError::AllocFailure => f.write_str("allocation failure in lock-graph engine"),
        }
    }
}

impl core::error::Error for LinkGraphError {}
