//! GPU backend abstraction layer.
//!
//! The runtime talks to the device only through the [`GpuBackend`] trait,
//! which models the surface of an explicit graphics API: queues with
//! monotonically signalled fences, command allocators and command lists,
//! committed resources in typed heaps, descriptor heaps, root signatures,
//! pipeline state objects and a swap chain.
//!
//! Device objects are referred to by small `Raw*` handles. Ownership of the
//! underlying object lives with exactly one wrapper on the runtime side
//! (a pool, a buffer, a cache); handles are plain copyable ids.
//!
//! # Available Backends
//!
//! - `dummy` (default): simulated device for tests, benches and headless runs

pub mod dummy;

use std::sync::Arc;

use crate::error::GraphicsError;
use crate::pipeline::{PipelineStateDesc, RootSignatureDesc};
use crate::types::{
    ClearFlags, ClearValue, CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle, HeapKind,
    IndexBufferView, PrimitiveTopology, QueueType, ResourceDesc, ResourceState, ScissorRect,
    TextureFormat, VertexBufferView, ViewDesc, Viewport,
};

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a backend object id.
            pub const fn from_raw(id: u64) -> Self {
                Self(id)
            }

            /// The backend object id.
            pub const fn as_raw(self) -> u64 {
                self.0
            }
        }
    };
}

raw_handle!(
    /// Hardware execution queue.
    RawQueue
);
raw_handle!(
    /// Monotonic 64-bit fence.
    RawFence
);
raw_handle!(
    /// Backing memory for recorded commands.
    RawCommandAllocator
);
raw_handle!(
    /// Command list recording into an allocator.
    RawCommandList
);
raw_handle!(
    /// Buffer or texture.
    RawResource
);
raw_handle!(
    /// Descriptor heap.
    RawDescriptorHeap
);
raw_handle!(
    /// Finalized root signature.
    RawRootSignature
);
raw_handle!(
    /// Finalized pipeline state object.
    RawPipelineState
);
raw_handle!(
    /// Presentation swap chain.
    RawSwapChain
);

/// Which half of a split transition barrier to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BarrierSplit {
    /// Full barrier.
    #[default]
    None,
    /// Begin half: the transition may start, nothing waits on it yet.
    BeginOnly,
    /// End half: work after this point sees the new state.
    EndOnly,
}

/// A single resource barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceBarrier {
    /// State transition of a whole resource.
    Transition {
        resource: RawResource,
        before: ResourceState,
        after: ResourceState,
        split: BarrierSplit,
    },
    /// Unordered access hazard. `None` means every UAV access.
    Uav { resource: Option<RawResource> },
    /// Two placed resources swap which one owns the memory.
    Aliasing {
        before: Option<RawResource>,
        after: Option<RawResource>,
    },
}

/// Whether a root binding targets the graphics or the compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
}

/// One command recorded into a command list.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ResourceBarrier(Vec<ResourceBarrier>),
    SetDescriptorHeaps(Vec<RawDescriptorHeap>),
    SetRootSignature(BindPoint, RawRootSignature),
    SetPipelineState(RawPipelineState),
    SetRenderTargets {
        rtvs: Vec<CpuDescriptorHandle>,
        dsv: Option<CpuDescriptorHandle>,
    },
    SetViewports(Vec<Viewport>),
    SetScissorRects(Vec<ScissorRect>),
    SetPrimitiveTopology(PrimitiveTopology),
    SetRootConstants {
        bind_point: BindPoint,
        root_index: u32,
        dest_offset: u32,
        values: Vec<u32>,
    },
    SetRootConstantBufferView {
        bind_point: BindPoint,
        root_index: u32,
        address: u64,
    },
    SetRootDescriptorTable {
        bind_point: BindPoint,
        root_index: u32,
        base: GpuDescriptorHandle,
    },
    SetVertexBuffers {
        start_slot: u32,
        views: Vec<VertexBufferView>,
    },
    SetIndexBuffer(IndexBufferView),
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    ClearRenderTarget {
        rtv: CpuDescriptorHandle,
        color: [f32; 4],
        rect: Option<ScissorRect>,
    },
    ClearDepthStencil {
        dsv: CpuDescriptorHandle,
        flags: ClearFlags,
        depth: f32,
        stencil: u8,
    },
    ClearUnorderedAccess {
        resource: RawResource,
        gpu: GpuDescriptorHandle,
        cpu: CpuDescriptorHandle,
        values: [u32; 4],
    },
    CopyBufferRegion {
        dest: RawResource,
        dest_offset: u64,
        src: RawResource,
        src_offset: u64,
        size: u64,
    },
    CopyResource {
        dest: RawResource,
        src: RawResource,
    },
    BeginEvent(String),
    EndEvent,
    SetMarker(String),
}

/// Description of a swap chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub buffer_count: u32,
    /// Frames the presentation engine may queue before the latency wait blocks.
    pub max_frame_latency: u32,
}

/// GPU backend trait for abstracting explicit graphics APIs.
///
/// Every call that can fail at the device level returns a
/// [`GraphicsError`]; none of them are retried by the runtime.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    // --- Queues and fences ---------------------------------------------

    /// Create a hardware queue.
    fn create_queue(&self, queue_type: QueueType) -> Result<RawQueue, GraphicsError>;

    /// Destroy a queue. All of its work must have completed.
    fn destroy_queue(&self, queue: RawQueue);

    /// Create a fence holding `initial_value`.
    fn create_fence(&self, initial_value: u64) -> Result<RawFence, GraphicsError>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: RawFence);

    /// Value the fence has reached. Returns `u64::MAX` once the device is lost.
    fn fence_completed_value(&self, fence: RawFence) -> u64;

    /// Block the calling thread until the fence reaches `value`.
    fn wait_for_fence_value(&self, fence: RawFence, value: u64) -> Result<(), GraphicsError>;

    /// Enqueue a signal of `fence` to `value` after all prior work on `queue`.
    fn queue_signal(&self, queue: RawQueue, fence: RawFence, value: u64)
    -> Result<(), GraphicsError>;

    /// Make `queue` wait on the GPU until `fence` reaches `value`.
    fn queue_wait(&self, queue: RawQueue, fence: RawFence, value: u64)
    -> Result<(), GraphicsError>;

    /// Submit a closed command list.
    fn execute_command_list(
        &self,
        queue: RawQueue,
        list: RawCommandList,
    ) -> Result<(), GraphicsError>;

    // --- Command allocators and lists ------------------------------------

    /// Create a command allocator for lists of the given queue type.
    fn create_command_allocator(
        &self,
        queue_type: QueueType,
    ) -> Result<RawCommandAllocator, GraphicsError>;

    /// Reclaim an allocator's memory. Its lists must have finished executing.
    fn reset_command_allocator(&self, allocator: RawCommandAllocator) -> Result<(), GraphicsError>;

    /// Destroy a command allocator.
    fn destroy_command_allocator(&self, allocator: RawCommandAllocator);

    /// Create a command list, open for recording into `allocator`.
    fn create_command_list(
        &self,
        queue_type: QueueType,
        allocator: RawCommandAllocator,
    ) -> Result<RawCommandList, GraphicsError>;

    /// Re-open a closed command list on `allocator`, dropping its commands.
    fn reset_command_list(
        &self,
        list: RawCommandList,
        allocator: RawCommandAllocator,
    ) -> Result<(), GraphicsError>;

    /// Close a command list for submission.
    fn close_command_list(&self, list: RawCommandList) -> Result<(), GraphicsError>;

    /// Destroy a command list.
    fn destroy_command_list(&self, list: RawCommandList);

    /// Record one command into an open list.
    fn record(&self, list: RawCommandList, command: Command) -> Result<(), GraphicsError>;

    // --- Resources ---------------------------------------------------------

    /// Create a committed resource.
    fn create_resource(
        &self,
        desc: &ResourceDesc,
        heap: HeapKind,
        initial_state: ResourceState,
        clear_value: Option<ClearValue>,
    ) -> Result<RawResource, GraphicsError>;

    /// Release a resource.
    fn destroy_resource(&self, resource: RawResource);

    /// GPU virtual address of a buffer.
    fn gpu_virtual_address(&self, resource: RawResource) -> u64;

    /// Write through the CPU mapping of an upload-heap buffer.
    fn write_mapped(
        &self,
        resource: RawResource,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError>;

    /// Read through the CPU mapping of an upload- or readback-heap buffer.
    fn read_mapped(
        &self,
        resource: RawResource,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), GraphicsError>;

    // --- Descriptors -------------------------------------------------------

    /// Byte distance between two descriptors of a heap type.
    fn descriptor_increment_size(&self, heap_type: DescriptorHeapType) -> u32;

    /// Create a descriptor heap of `count` descriptors.
    fn create_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
        count: u32,
        shader_visible: bool,
    ) -> Result<RawDescriptorHeap, GraphicsError>;

    /// Destroy a descriptor heap.
    fn destroy_descriptor_heap(&self, heap: RawDescriptorHeap);

    /// CPU handle of the heap's first descriptor.
    fn descriptor_heap_cpu_start(&self, heap: RawDescriptorHeap) -> CpuDescriptorHandle;

    /// GPU handle of the heap's first descriptor. Null for non shader-visible heaps.
    fn descriptor_heap_gpu_start(&self, heap: RawDescriptorHeap) -> GpuDescriptorHandle;

    /// Write a view into the descriptor at `dest`.
    fn create_view(&self, desc: &ViewDesc, dest: CpuDescriptorHandle);

    /// Copy `src` descriptors into consecutive slots starting at `dest`.
    fn copy_descriptors(
        &self,
        heap_type: DescriptorHeapType,
        dest: CpuDescriptorHandle,
        src: &[CpuDescriptorHandle],
    );

    // --- Pipeline objects -------------------------------------------------

    /// Create a root signature.
    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<RawRootSignature, GraphicsError>;

    /// Destroy a root signature.
    fn destroy_root_signature(&self, root_signature: RawRootSignature);

    /// Create a graphics or compute pipeline state object.
    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDesc,
    ) -> Result<RawPipelineState, GraphicsError>;

    /// Destroy a pipeline state object.
    fn destroy_pipeline_state(&self, pipeline: RawPipelineState);

    // --- Swap chain ---------------------------------------------------------

    /// Create a swap chain presenting from `queue`.
    fn create_swap_chain(
        &self,
        queue: RawQueue,
        desc: &SwapChainDesc,
    ) -> Result<RawSwapChain, GraphicsError>;

    /// Fetch a back buffer. The caller must release it with
    /// [`destroy_resource`](Self::destroy_resource) before resizing.
    fn swap_chain_buffer(
        &self,
        swap_chain: RawSwapChain,
        index: u32,
    ) -> Result<RawResource, GraphicsError>;

    /// Resize all back buffers.
    fn resize_swap_chain(
        &self,
        swap_chain: RawSwapChain,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError>;

    /// Index of the back buffer the next frame renders into.
    fn current_back_buffer_index(&self, swap_chain: RawSwapChain) -> u32;

    /// Block on the frame-latency waitable until the swap chain accepts a frame.
    fn wait_frame_latency(&self, swap_chain: RawSwapChain) -> Result<(), GraphicsError>;

    /// Present the current back buffer.
    fn present(&self, swap_chain: RawSwapChain, sync_interval: u32) -> Result<(), GraphicsError>;

    /// Destroy a swap chain.
    fn destroy_swap_chain(&self, swap_chain: RawSwapChain);
}

/// Selects and creates the appropriate backend based on available features.
pub fn create_backend() -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    #[cfg(feature = "dummy")]
    {
        log::info!("Using dummy backend");
        Ok(Arc::new(dummy::DummyBackend::new()))
    }

    #[cfg(not(feature = "dummy"))]
    {
        Err(GraphicsError::InitializationFailed(
            "no GPU backend enabled".to_string(),
        ))
    }
}
