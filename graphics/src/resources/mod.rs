//! GPU resources.
//!
//! Every resource wraps a [`GpuResource`], which tracks the state the
//! resource will be in once all recorded barriers have executed:
//! - [`ColorBuffer`] - render target with shader and unordered-access views
//! - [`DepthBuffer`] - depth/stencil target with a sampled depth view
//! - [`GpuBuffer`] - GPU-local buffer with shader views
//! - [`ReadbackBuffer`] - CPU-readable copy destination
//!
//! Resources are owned by exactly one wrapper and released when it is dropped
//! or [`destroy`](GpuResource::destroy)ed. Releasing a resource the GPU is
//! still using is the caller's responsibility.

mod color_buffer;
mod depth_buffer;
mod gpu_buffer;
mod gpu_resource;
mod pixel_buffer;
mod readback_buffer;

pub use color_buffer::ColorBuffer;
pub use depth_buffer::DepthBuffer;
pub use gpu_buffer::{BufferKind, GpuBuffer};
pub use gpu_resource::GpuResource;
pub use pixel_buffer::PixelBuffer;
pub use readback_buffer::ReadbackBuffer;
