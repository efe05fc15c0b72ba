//! Fence-gated retirement queue.
//!
//! Command allocators, linear allocation pages and shader-visible descriptor
//! heaps all follow the same life cycle:
//!
//! ```text
//!   in use ──retire(fence)──▶ retired ──fence complete──▶ available
//!      ▲                                                      │
//!      └────────────────────── reissued ◀─────────────────────┘
//! ```
//!
//! The retired → available step is lazy: nothing polls in the background,
//! the owning pool checks the oldest entry when a new object is requested.
//! Entries are kept FIFO, and fence values issued by one queue only grow, so
//! the front entry is always the first one to become safe.

use std::collections::VecDeque;

/// FIFO of items waiting for a fence value to complete.
#[derive(Debug)]
pub struct RetiredQueue<T> {
    entries: VecDeque<(u64, T)>,
}

impl<T> Default for RetiredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RetiredQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Retire `item` until `fence_value` completes.
    ///
    /// Two contexts finishing on different threads may retire their fences
    /// out of order. The later item then only waits behind the earlier one.
    pub fn retire(&mut self, fence_value: u64, item: T) {
        self.entries.push_back((fence_value, item));
    }

    /// Pop the oldest item if `is_complete` reports its fence as done.
    pub fn pop_ready(&mut self, is_complete: impl FnOnce(u64) -> bool) -> Option<T> {
        let &(fence, _) = self.entries.front()?;
        if is_complete(fence) {
            self.entries.pop_front().map(|(_, item)| item)
        } else {
            None
        }
    }

    /// Pop every leading item whose fence is done.
    pub fn drain_ready(&mut self, mut is_complete: impl FnMut(u64) -> bool) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some(item) = self.pop_ready(&mut is_complete) {
            ready.push(item);
        }
        ready
    }

    /// Remove every item regardless of its fence. Used at shutdown once the
    /// GPU is idle.
    pub fn drain_all(&mut self) -> impl Iterator<Item = T> + '_ {
        self.entries.drain(..).map(|(_, item)| item)
    }

    /// Fence value of the oldest retired item.
    pub fn front_fence(&self) -> Option<u64> {
        self.entries.front().map(|&(fence, _)| fence)
    }

    /// Number of retired items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retired.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_ready_respects_fence() {
        let mut queue = RetiredQueue::new();
        queue.retire(1, "a");
        queue.retire(2, "b");

        assert_eq!(queue.pop_ready(|f| f <= 0), None);
        assert_eq!(queue.pop_ready(|f| f <= 1), Some("a"));
        assert_eq!(queue.pop_ready(|f| f <= 1), None);
        assert_eq!(queue.front_fence(), Some(2));
    }

    #[test]
    fn test_drain_ready_stops_at_first_pending() {
        let mut queue = RetiredQueue::new();
        for fence in 1..=5 {
            queue.retire(fence, fence);
        }
        assert_eq!(queue.drain_ready(|f| f <= 3), vec![1, 2, 3]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain_all().collect::<Vec<_>>(), vec![4, 5]);
        assert!(queue.is_empty());
    }
}
