//! Pending-call table.
//!
//! Maps each outstanding correlation id to the handler waiting for its
//! `result`. Ids come from a counter owned by the table, so they are unique
//! for the lifetime of the connection and strictly increasing from 1.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::identifiers::CallId;

// ============================================================================
// PendingCalls
// ============================================================================

/// Outstanding calls keyed by correlation id.
#[derive(Debug)]
pub(crate) struct PendingCalls<H> {
    /// Last id handed out.
    last_id: u64,
    /// Handlers by id.
    entries: FxHashMap<CallId, H>,
}

impl<H> Default for PendingCalls<H> {
    fn default() -> Self {
        Self {
            last_id: 0,
            entries: FxHashMap::default(),
        }
    }
}

impl<H> PendingCalls<H> {
    /// Allocates a fresh id and records `handler` under it.
    pub(crate) fn register(&mut self, handler: H) -> CallId {
        self.last_id += 1;
        let id = CallId::new(self.last_id);
        let previous = self.entries.insert(id, handler);
        debug_assert!(previous.is_none(), "call id {id} reused");
        id
    }

    /// Removes and returns the handler for `id`.
    ///
    /// Returns `None` if the id is unknown or was already resolved.
    #[inline]
    pub(crate) fn take(&mut self, id: CallId) -> Option<H> {
        self.entries.remove(&id)
    }

    /// Removes every entry, in id order.
    pub(crate) fn drain(&mut self) -> Vec<(CallId, H)> {
        let mut drained: Vec<_> = self.entries.drain().collect();
        drained.sort_unstable_by_key(|(id, _)| *id);
        drained
    }

    /// Returns the number of outstanding calls.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut pending = PendingCalls::default();
        let ids: Vec<_> = (0..3).map(|n| pending.register(n)).collect();
        assert_eq!(ids, vec![CallId::new(1), CallId::new(2), CallId::new(3)]);
        assert_eq!(pending.len(), 3);
    }

    #[test]
    fn test_take_is_at_most_once() {
        let mut pending = PendingCalls::default();
        let id = pending.register("handler");
        assert_eq!(pending.take(id), Some("handler"));
        assert_eq!(pending.take(id), None);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_ids_not_reused_after_take() {
        let mut pending = PendingCalls::default();
        let first = pending.register(());
        pending.take(first);
        let second = pending.register(());
        assert!(second > first);
    }

    #[test]
    fn test_drain_in_id_order() {
        let mut pending = PendingCalls::default();
        for n in 0..5 {
            pending.register(n);
        }
        let drained: Vec<_> = pending.drain().into_iter().map(|(_, n)| n).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert_eq!(pending.len(), 0);
    }
}
