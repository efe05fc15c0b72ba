//! Owner of the graphics, compute and copy queues.

use std::sync::Arc;

use crate::backend::{GpuBackend, RawCommandAllocator, RawCommandList};
use crate::error::GraphicsError;
use crate::types::{QueueType, queue_type_from_fence};

use super::queue::CommandQueue;

/// The three hardware queues of a device.
///
/// Fence values carry their queue type, so completion queries and waits can
/// be routed from the value alone.
pub struct CommandListManager {
    backend: Arc<dyn GpuBackend>,
    graphics: CommandQueue,
    compute: CommandQueue,
    copy: CommandQueue,
}

impl std::fmt::Debug for CommandListManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandListManager")
            .field("graphics", &self.graphics)
            .field("compute", &self.compute)
            .field("copy", &self.copy)
            .finish()
    }
}

impl CommandListManager {
    /// Create all three queues.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Result<Self, GraphicsError> {
        Ok(Self {
            graphics: CommandQueue::new(backend.clone(), QueueType::Graphics)?,
            compute: CommandQueue::new(backend.clone(), QueueType::Compute)?,
            copy: CommandQueue::new(backend.clone(), QueueType::Copy)?,
            backend,
        })
    }

    /// Queue of the given type.
    pub fn queue(&self, queue_type: QueueType) -> &CommandQueue {
        match queue_type {
            QueueType::Graphics => &self.graphics,
            QueueType::Compute => &self.compute,
            QueueType::Copy => &self.copy,
        }
    }

    /// The graphics (direct) queue.
    pub fn graphics_queue(&self) -> &CommandQueue {
        &self.graphics
    }

    /// The asynchronous compute queue.
    pub fn compute_queue(&self) -> &CommandQueue {
        &self.compute
    }

    /// The copy queue.
    pub fn copy_queue(&self) -> &CommandQueue {
        &self.copy
    }

    /// Create a command list recording into a fresh or recycled allocator.
    pub fn create_new_command_list(
        &self,
        queue_type: QueueType,
    ) -> Result<(RawCommandList, RawCommandAllocator), GraphicsError> {
        let queue = self.queue(queue_type);
        let allocator = queue.request_allocator()?;
        match self.backend.create_command_list(queue_type, allocator) {
            Ok(list) => Ok((list, allocator)),
            Err(e) => {
                queue.discard_allocator(queue.last_completed_fence_value(), allocator);
                Err(e)
            }
        }
    }

    fn queue_for_fence(&self, fence_value: u64) -> &CommandQueue {
        self.queue(queue_type_from_fence(fence_value).unwrap_or(QueueType::Graphics))
    }

    /// Whether the submission that signalled `fence_value` has finished,
    /// on whichever queue issued it.
    pub fn is_fence_complete(&self, fence_value: u64) -> bool {
        self.queue_for_fence(fence_value)
            .is_fence_complete(fence_value)
    }

    /// Block until `fence_value` completes on the queue that issued it.
    pub fn wait_for_fence(&self, fence_value: u64) -> Result<(), GraphicsError> {
        self.queue_for_fence(fence_value).wait_for_fence(fence_value)
    }

    /// Make `consumer` wait on the GPU for `fence_value` from its producer queue.
    pub fn stall_for_fence(
        &self,
        consumer: QueueType,
        fence_value: u64,
    ) -> Result<(), GraphicsError> {
        let producer = self.queue_for_fence(fence_value);
        self.queue(consumer).stall_for_fence(producer, fence_value)
    }

    /// Block until every queue has drained.
    pub fn idle_gpu(&self) -> Result<(), GraphicsError> {
        self.graphics.wait_for_idle()?;
        self.compute.wait_for_idle()?;
        self.copy.wait_for_idle()
    }
}
