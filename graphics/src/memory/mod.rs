//! GPU memory and descriptor allocation.
//!
//! - [`linear_allocator`]: page-based bump allocation of transient buffer memory
//! - [`descriptor_allocator`]: permanent CPU descriptors and user-managed heaps
//! - [`dynamic_descriptor_heap`]: per-context shader-visible descriptors
//!
//! Everything that can still be referenced by in-flight GPU work is recycled
//! through a [`RetiredQueue`].

pub mod descriptor_allocator;
pub mod dynamic_descriptor_heap;
pub mod linear_allocator;
mod retire;

pub use descriptor_allocator::{DescriptorAllocator, DescriptorHandle, UserDescriptorHeap};
pub use dynamic_descriptor_heap::{DescriptorHeapPool, DynamicDescriptor, DynamicDescriptorHeap};
pub use linear_allocator::{
    DynAlloc, LinearAllocator, LinearAllocatorPageManager, LinearAllocatorType, LinearPage,
    align_up,
};
pub use retire::RetiredQueue;
