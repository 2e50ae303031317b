//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing correlation ids with fiber ids.
//!
//! | Type | Scope | Wire format |
//! |------|-------|-------------|
//! | [`CallId`] | One connection | Decimal string (`"1"`, `"2"`, ...) |
//! | [`FiberId`] | Process | Not sent |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Serializer};

// ============================================================================
// CallId
// ============================================================================

/// Correlation id linking a `method` message to its `result`.
///
/// Assigned from a per-connection counter starting at 1 and never reused.
/// Rendered on the wire as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    /// Creates a call id from its numeric value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parses an id as it appears on the wire.
    ///
    /// Only the canonical decimal rendering is accepted, so `"07"` or `"+7"`
    /// never match the call registered as `"7"`.
    #[must_use]
    pub fn from_wire(text: &str) -> Option<Self> {
        let value: u64 = text.parse().ok()?;
        (value.to_string() == text).then_some(Self(value))
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CallId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// FiberId
// ============================================================================

/// Global fiber counter.
static NEXT_FIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one cooperative task started through [`crate::fiber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(u64);

impl FiberId {
    /// Allocates the next process-unique fiber id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fiber-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_serializes_as_string() {
        let json = serde_json::to_string(&CallId::new(42)).expect("serialize");
        assert_eq!(json, "\"42\"");
    }

    #[test]
    fn test_call_id_from_wire() {
        assert_eq!(CallId::from_wire("7"), Some(CallId::new(7)));
        assert_eq!(CallId::from_wire("07"), None);
        assert_eq!(CallId::from_wire("+7"), None);
        assert_eq!(CallId::from_wire("abc"), None);
        assert_eq!(CallId::from_wire(""), None);
    }

    #[test]
    fn test_fiber_ids_are_unique() {
        let a = FiberId::next();
        let b = FiberId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }
}
