//! Hardware queue with its monotonic fence.
//!
//! Each [`CommandQueue`] owns one backend queue and one fence. Fence values
//! are namespaced by queue type in the high byte (see
//! [`fence_base`](crate::types::fence_base)), so a value alone tells which
//! queue issued it.
//!
//! Two locks guard a queue:
//!
//! - the submission lock pairs "signal the next value" with "increment the
//!   counter", so concurrent submitters never issue the same value
//! - the event lock serializes blocking CPU waits, so waiters never hold up
//!   submitters

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::allocator_pool::CommandAllocatorPool;
use crate::backend::{GpuBackend, RawCommandAllocator, RawCommandList, RawFence, RawQueue};
use crate::error::GraphicsError;
use crate::profile_scope;
use crate::types::{QueueType, fence_base};

/// One hardware execution queue.
pub struct CommandQueue {
    queue_type: QueueType,
    backend: Arc<dyn GpuBackend>,
    raw: RawQueue,
    fence: RawFence,
    /// Next value to signal. The mutex is the submission lock.
    next_fence_value: Mutex<u64>,
    /// Cached completed value, only ever raised.
    last_completed: AtomicU64,
    event_lock: Mutex<()>,
    allocator_pool: CommandAllocatorPool,
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("queue_type", &self.queue_type)
            .field("raw", &self.raw)
            .field("last_completed", &self.last_completed_fence_value())
            .finish_non_exhaustive()
    }
}

impl CommandQueue {
    /// Create the queue and its fence.
    pub fn new(backend: Arc<dyn GpuBackend>, queue_type: QueueType) -> Result<Self, GraphicsError> {
        let base = fence_base(queue_type);
        let raw = backend.create_queue(queue_type)?;
        let fence = match backend.create_fence(base) {
            Ok(fence) => fence,
            Err(e) => {
                backend.destroy_queue(raw);
                return Err(e);
            }
        };
        log::info!("Created {} queue {:?}", queue_type.name(), raw);

        Ok(Self {
            queue_type,
            allocator_pool: CommandAllocatorPool::new(backend.clone(), queue_type),
            backend,
            raw,
            fence,
            next_fence_value: Mutex::new(base | 1),
            last_completed: AtomicU64::new(base),
            event_lock: Mutex::new(()),
        })
    }

    /// Queue type.
    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Backend queue handle.
    pub fn raw(&self) -> RawQueue {
        self.raw
    }

    /// Backend fence handle.
    pub fn fence(&self) -> RawFence {
        self.fence
    }

    /// Close `list`, submit it and signal the next fence value.
    ///
    /// Returns the signalled value. Values returned by successive calls are
    /// strictly increasing.
    pub fn execute_command_list(&self, list: RawCommandList) -> Result<u64, GraphicsError> {
        profile_scope!("execute_command_list");
        let mut next = self.next_fence_value.lock();
        self.backend.close_command_list(list)?;
        self.backend.execute_command_list(self.raw, list)?;
        self.backend.queue_signal(self.raw, self.fence, *next)?;
        let value = *next;
        *next += 1;
        Ok(value)
    }

    /// Signal the next fence value without submitting work.
    pub fn increment_fence(&self) -> Result<u64, GraphicsError> {
        let mut next = self.next_fence_value.lock();
        self.backend.queue_signal(self.raw, self.fence, *next)?;
        let value = *next;
        *next += 1;
        Ok(value)
    }

    /// Value the next submission will signal.
    pub fn next_fence_value(&self) -> u64 {
        *self.next_fence_value.lock()
    }

    /// Last completed value seen by this queue, without asking the device.
    pub fn last_completed_fence_value(&self) -> u64 {
        self.last_completed.load(Ordering::Acquire)
    }

    /// Refresh the cached completed value from the device.
    pub fn poll_current_fence_value(&self) -> u64 {
        let completed = self.backend.fence_completed_value(self.fence);
        let previous = self.last_completed.fetch_max(completed, Ordering::AcqRel);
        previous.max(completed)
    }

    /// Whether the work that signalled `value` has finished.
    ///
    /// Only asks the device when the cached value is behind `value`.
    pub fn is_fence_complete(&self, value: u64) -> bool {
        if value > self.last_completed.load(Ordering::Acquire) {
            self.poll_current_fence_value();
        }
        value <= self.last_completed.load(Ordering::Acquire)
    }

    /// Block until `value` completes. Returns at once if it already has.
    pub fn wait_for_fence(&self, value: u64) -> Result<(), GraphicsError> {
        if self.is_fence_complete(value) {
            return Ok(());
        }
        let _event = self.event_lock.lock();
        self.backend.wait_for_fence_value(self.fence, value)?;
        self.last_completed.fetch_max(value, Ordering::AcqRel);
        Ok(())
    }

    /// Block until everything submitted so far has completed.
    pub fn wait_for_idle(&self) -> Result<(), GraphicsError> {
        let value = self.increment_fence()?;
        self.wait_for_fence(value)
    }

    /// Make this queue wait on the GPU until `producer` reaches `value`.
    ///
    /// The CPU does not block.
    pub fn stall_for_fence(&self, producer: &CommandQueue, value: u64) -> Result<(), GraphicsError> {
        self.backend.queue_wait(self.raw, producer.fence, value)
    }

    /// Make this queue wait for everything already submitted to `producer`.
    pub fn stall_for_producer(&self, producer: &CommandQueue) -> Result<(), GraphicsError> {
        let value = producer.next_fence_value() - 1;
        self.stall_for_fence(producer, value)
    }

    /// Get a command allocator whose previous work has completed.
    pub fn request_allocator(&self) -> Result<RawCommandAllocator, GraphicsError> {
        let completed = self.poll_current_fence_value();
        self.allocator_pool.request_allocator(completed)
    }

    /// Hand back an allocator used by a submission that signalled `fence_value`.
    pub fn discard_allocator(&self, fence_value: u64, allocator: RawCommandAllocator) {
        self.allocator_pool.discard_allocator(fence_value, allocator);
    }

    /// The queue's allocator pool.
    pub fn allocator_pool(&self) -> &CommandAllocatorPool {
        &self.allocator_pool
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.allocator_pool.shutdown();
        self.backend.destroy_fence(self.fence);
        self.backend.destroy_queue(self.raw);
        log::debug!("Destroyed {} queue", self.queue_type.name());
    }
}
