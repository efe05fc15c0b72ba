//! Per-queue pool of command allocators.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, RawCommandAllocator};
use crate::error::GraphicsError;
use crate::memory::RetiredQueue;
use crate::types::QueueType;

struct PoolInner {
    /// Every allocator this pool ever created.
    all: Vec<RawCommandAllocator>,
    retired: RetiredQueue<RawCommandAllocator>,
}

/// Recycles command allocators once the fence of their last submission
/// has completed.
///
/// An allocator discarded with fence value `f` is only handed out again by
/// [`request_allocator`](Self::request_allocator) when the caller reports a
/// completed value `>= f`.
pub struct CommandAllocatorPool {
    queue_type: QueueType,
    backend: Arc<dyn GpuBackend>,
    inner: Mutex<PoolInner>,
}

impl CommandAllocatorPool {
    /// Create an empty pool for one queue type.
    pub fn new(backend: Arc<dyn GpuBackend>, queue_type: QueueType) -> Self {
        Self {
            queue_type,
            backend,
            inner: Mutex::new(PoolInner {
                all: Vec::new(),
                retired: RetiredQueue::new(),
            }),
        }
    }

    /// Queue type the pool's allocators record for.
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Get an allocator ready for recording.
    ///
    /// Reuses the oldest retired allocator if its fence is `<=
    /// completed_fence_value`, resetting it first; otherwise creates one.
    pub fn request_allocator(
        &self,
        completed_fence_value: u64,
    ) -> Result<RawCommandAllocator, GraphicsError> {
        let mut inner = self.inner.lock();

        if let Some(allocator) = inner
            .retired
            .pop_ready(|fence| fence <= completed_fence_value)
        {
            self.backend.reset_command_allocator(allocator)?;
            log::trace!(
                "Reusing {} command allocator {:?}",
                self.queue_type.name(),
                allocator
            );
            return Ok(allocator);
        }

        let allocator = self.backend.create_command_allocator(self.queue_type)?;
        inner.all.push(allocator);
        log::debug!(
            "Created {} command allocator #{} ({:?})",
            self.queue_type.name(),
            inner.all.len(),
            allocator
        );
        Ok(allocator)
    }

    /// Return an allocator whose commands were submitted with `fence_value`.
    pub fn discard_allocator(&self, fence_value: u64, allocator: RawCommandAllocator) {
        self.inner.lock().retired.retire(fence_value, allocator);
    }

    /// Number of allocators created so far.
    pub fn size(&self) -> usize {
        self.inner.lock().all.len()
    }

    /// Number of allocators waiting in the retired queue.
    pub fn retired_count(&self) -> usize {
        self.inner.lock().retired.len()
    }

    /// Destroy every allocator. The queue must be idle.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.retired.drain_all().for_each(drop);
        for allocator in inner.all.drain(..) {
            self.backend.destroy_command_allocator(allocator);
        }
    }
}

impl Drop for CommandAllocatorPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn pool() -> (Arc<DummyBackend>, CommandAllocatorPool) {
        let backend = Arc::new(DummyBackend::new());
        let pool = CommandAllocatorPool::new(backend.clone(), QueueType::Graphics);
        (backend, pool)
    }

    #[test]
    fn test_three_allocators_then_reuse() {
        let (backend, pool) = pool();

        let allocators: Vec<_> = (0..3).map(|_| pool.request_allocator(0).unwrap()).collect();
        assert_eq!(pool.size(), 3);
        assert_ne!(allocators[0], allocators[1]);
        assert_ne!(allocators[1], allocators[2]);

        for (fence, allocator) in (1..=3).zip(&allocators) {
            pool.discard_allocator(fence, *allocator);
        }

        let reused = pool.request_allocator(3).unwrap();
        assert!(allocators.contains(&reused));
        assert_eq!(pool.size(), 3);
        assert_eq!(backend.stats().command_allocators_created, 3);
    }

    #[test]
    fn test_pending_fence_forces_new_allocator() {
        let (_backend, pool) = pool();
        let first = pool.request_allocator(0).unwrap();
        pool.discard_allocator(5, first);

        let second = pool.request_allocator(4).unwrap();
        assert_ne!(first, second);
        assert_eq!(pool.retired_count(), 1);

        assert_eq!(pool.request_allocator(5).unwrap(), first);
        assert_eq!(pool.retired_count(), 0);
    }

    #[test]
    fn test_shutdown_destroys_allocators() {
        let (backend, pool) = pool();
        let a = pool.request_allocator(0).unwrap();
        pool.request_allocator(0).unwrap();
        pool.discard_allocator(1, a);
        assert_eq!(backend.live_command_allocators(), 2);
        drop(pool);
        assert_eq!(backend.live_command_allocators(), 0);
    }
}
