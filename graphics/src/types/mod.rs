//! Common types and descriptors for GPU resources.
//!
//! This module contains resource states, queue types, formats, descriptor
//! handles and the resource/view descriptors consumed by the backend.

mod common;
mod descriptor;
mod queue;
mod resource;
mod sampler;
mod state;
mod texture;

pub use common::{
    ClearFlags, ClearValue, IndexBufferView, IndexFormat, PrimitiveTopology, ScissorRect,
    VertexBufferView, Viewport,
};
pub use descriptor::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle, ViewDesc};
pub use queue::{QueueType, fence_base, queue_type_from_fence};
pub use resource::{HeapKind, ResourceDesc, ResourceDimension, ResourceFlags};
pub use sampler::{AddressMode, BorderColor, CompareFunction, FilterMode, SamplerDesc};
pub use state::ResourceState;
pub use texture::TextureFormat;
