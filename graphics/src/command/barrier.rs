//! Bounded batch of pending resource barriers.

use crate::backend::ResourceBarrier;

/// Barriers a context buffers before recording them in one call.
pub const MAX_PENDING_BARRIERS: usize = 16;

/// Pending barriers of one command context.
///
/// The owner flushes when [`is_full`](Self::is_full) reports true, so the
/// batch never grows past [`MAX_PENDING_BARRIERS`].
#[derive(Debug)]
pub struct BarrierBatch {
    pending: Vec<ResourceBarrier>,
}

impl Default for BarrierBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_PENDING_BARRIERS),
        }
    }

    pub fn push(&mut self, barrier: ResourceBarrier) {
        debug_assert!(
            self.pending.len() < MAX_PENDING_BARRIERS,
            "barrier batch overflow"
        );
        self.pending.push(barrier);
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= MAX_PENDING_BARRIERS
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &[ResourceBarrier] {
        &self.pending
    }

    /// Take every pending barrier, leaving the batch empty.
    pub fn take(&mut self) -> Vec<ResourceBarrier> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(MAX_PENDING_BARRIERS))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
