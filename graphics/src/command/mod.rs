//! Command submission.
//!
//! - [`CommandQueue`] - one hardware queue with its fence
//! - [`CommandListManager`] - the graphics, compute and copy queues
//! - [`CommandAllocatorPool`] - fence-gated reuse of command allocators
//! - [`CommandContext`] and its [`GraphicsContext`], [`ComputeContext`] and
//!   [`CopyContext`] views - recording with batched barriers
//! - [`ContextManager`] - pool of reusable contexts

mod allocator_pool;
mod barrier;
mod compute;
mod context;
mod context_manager;
mod copy;
mod graphics;
mod manager;
mod queue;

pub use allocator_pool::CommandAllocatorPool;
pub use barrier::{BarrierBatch, MAX_PENDING_BARRIERS};
pub use compute::{ComputeCommands, ComputeContext};
pub use context::{CommandContext, ContextState};
pub use context_manager::ContextManager;
pub use copy::CopyContext;
pub use graphics::GraphicsContext;
pub use manager::CommandListManager;
pub use queue::CommandQueue;
