//! # Stratus Graphics
//!
//! GPU command, fence and transient-memory runtime for the Stratus renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - owns the queues, pools and caches of one GPU
//! - [`CommandContext`] with its [`GraphicsContext`], [`ComputeContext`] and
//!   [`CopyContext`] views - pooled command recording with batched barriers
//! - [`memory`] - fence-retired linear upload memory and descriptor heaps
//! - [`SwapChain`] and [`FrameLoop`] - presentation with frames in flight
//! - [`GpuBackend`] - trait over the device API, with a simulated
//!   [`DummyBackend`] for tests and headless runs
//!
//! ## Synchronization
//!
//! Every queue owns a fence whose values carry the queue type in the high
//! byte, so a bare `u64` names both the queue and the point in its timeline.
//! Anything the GPU may still read (command allocators, linear pages,
//! descriptor heaps) is retired with the fence value of the submission that
//! used it and reused only once that value has completed.
//!
//! ## Example
//!
//! ```ignore
//! use stratus_graphics::{GraphicsConfig, GraphicsDevice, ResourceState};
//!
//! let device = GraphicsDevice::new(GraphicsConfig::default())?;
//! let mut ctx = device.begin_graphics("Upload")?;
//! let upload = ctx.upload_bytes(&vertices)?;
//! ctx.copy_from_upload(&mut vertex_buffer, 0, &upload, vertices.len() as u64)?;
//! ctx.transition_resource(&mut vertex_buffer, ResourceState::VERTEX_AND_CONSTANT_BUFFER, false)?;
//! let fence = ctx.finish(false)?;
//! device.wait_for_fence(fence)?;
//! ```

pub mod backend;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod memory;
pub mod pipeline;
pub mod profiling;
pub mod resources;
pub mod swapchain;
pub mod types;

// Re-export main types for convenience
pub use backend::{GpuBackend, create_backend, dummy::DummyBackend};
pub use command::{
    CommandContext, CommandListManager, CommandQueue, ComputeCommands, ComputeContext,
    CopyContext, GraphicsContext,
};
pub use config::GraphicsConfig;
pub use device::GraphicsDevice;
pub use error::GraphicsError;
pub use frame::{FrameLoop, FramePacer, FrameState, FrameTargets};
pub use memory::DynAlloc;
pub use pipeline::{ComputePso, GraphicsPso, RootSignature, RootSignatureDesc};
pub use resources::{ColorBuffer, DepthBuffer, GpuBuffer, GpuResource, ReadbackBuffer};
pub use swapchain::{PresentMode, SwapChain, SwapChainConfiguration};
pub use types::{
    CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle, QueueType, ResourceState,
    TextureFormat,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
