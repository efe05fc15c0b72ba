//! Command contexts.
//!
//! A [`CommandContext`] is one unit of recording work: it owns a command list
//! and the allocator behind it, batches resource barriers, hands out
//! transient memory and shader-visible descriptors, and tracks what is bound
//! so redundant binds are skipped.
//!
//! ```text
//!   begin_*() ──▶ recording ──finish()──▶ submitted, back in the pool
//!                    │  ▲
//!                    └──┘ flush(): submitted, list re-opened, bindings restored
//! ```
//!
//! The pooled part ([`ContextState`]) survives between uses; the
//! `CommandContext` wrapper exists only while recording. Dropping a context
//! without finishing it discards its commands and retires everything it
//! allocated against a fresh fence.

use std::sync::Arc;

use crate::backend::{
    BarrierSplit, BindPoint, Command, GpuBackend, RawCommandAllocator, RawCommandList,
    RawDescriptorHeap, RawPipelineState, ResourceBarrier,
};
use crate::command::barrier::BarrierBatch;
use crate::command::CommandListManager;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::memory::{DynAlloc, DynamicDescriptorHeap, LinearAllocator};
use crate::pipeline::RootSignature;
use crate::profile_scope;
use crate::resources::{GpuResource, ReadbackBuffer};
use crate::types::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle, QueueType, ResourceState};

/// Objects bound on the command list, replayed after a flush.
#[derive(Debug, Default)]
pub(crate) struct BoundState {
    pub graphics_root_signature: Option<RootSignature>,
    pub compute_root_signature: Option<RootSignature>,
    pub pipeline_state: Option<RawPipelineState>,
    /// View heap, then sampler heap.
    pub descriptor_heaps: [Option<RawDescriptorHeap>; 2],
}

/// The recyclable part of a command context.
pub struct ContextState {
    id: u64,
    queue_type: QueueType,
    backend: Arc<dyn GpuBackend>,
    commands: Arc<CommandListManager>,
    list: RawCommandList,
    allocator: RawCommandAllocator,
    /// Whether the list is open on `allocator`.
    recording: bool,
    barriers: BarrierBatch,
    cpu_linear: LinearAllocator,
    gpu_linear: LinearAllocator,
    view_heap: DynamicDescriptorHeap,
    sampler_heap: DynamicDescriptorHeap,
    bound: BoundState,
    label: String,
    /// Labels of the event regions open on the list, outermost first.
    open_events: Vec<String>,
}

impl ContextState {
    pub(crate) fn new(
        device: &GraphicsDevice,
        id: u64,
        queue_type: QueueType,
    ) -> Result<Self, GraphicsError> {
        let commands = device.commands().clone();
        let (list, allocator) = commands.create_new_command_list(queue_type)?;
        log::debug!("Created {} command context #{id}", queue_type.name());
        Ok(Self {
            id,
            queue_type,
            backend: device.backend().clone(),
            commands,
            list,
            allocator,
            recording: true,
            barriers: BarrierBatch::new(),
            cpu_linear: LinearAllocator::new(device.cpu_page_manager().clone()),
            gpu_linear: LinearAllocator::new(device.gpu_page_manager().clone()),
            view_heap: DynamicDescriptorHeap::new(device.view_heap_pool().clone()),
            sampler_heap: DynamicDescriptorHeap::new(device.sampler_heap_pool().clone()),
            bound: BoundState::default(),
            label: String::new(),
            open_events: Vec::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Re-open the list on a fresh allocator for the next user.
    pub(crate) fn reset(&mut self) -> Result<(), GraphicsError> {
        debug_assert!(!self.recording);
        let queue = self.commands.queue(self.queue_type);
        let allocator = queue.request_allocator()?;
        if let Err(e) = self.backend.reset_command_list(self.list, allocator) {
            queue.discard_allocator(queue.last_completed_fence_value(), allocator);
            return Err(e);
        }
        self.allocator = allocator;
        self.recording = true;
        self.barriers.clear();
        self.bound = BoundState::default();
        self.open_events.clear();
        Ok(())
    }

    /// Hand the allocator, pages and heaps back to their pools against
    /// `fence_value` and clear per-use state.
    fn retire(&mut self, fence_value: u64) {
        self.commands
            .queue(self.queue_type)
            .discard_allocator(fence_value, self.allocator);
        self.recording = false;
        self.cpu_linear.cleanup_used_pages(fence_value);
        self.gpu_linear.cleanup_used_pages(fence_value);
        self.view_heap.cleanup_used_heaps(fence_value);
        self.sampler_heap.cleanup_used_heaps(fence_value);
        self.barriers.clear();
        self.bound = BoundState::default();
        self.open_events.clear();
    }
}

impl Drop for ContextState {
    fn drop(&mut self) {
        if self.recording {
            log::warn!(
                "{} context {:?} dropped without finish, discarding its commands",
                self.queue_type.name(),
                self.label
            );
            let _ = self.backend.close_command_list(self.list);
            let queue = self.commands.queue(self.queue_type);
            let fence = queue
                .increment_fence()
                .unwrap_or_else(|_| queue.next_fence_value());
            self.retire(fence);
        }
        self.backend.destroy_command_list(self.list);
    }
}

impl std::fmt::Debug for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextState")
            .field("id", &self.id)
            .field("queue_type", &self.queue_type)
            .field("list", &self.list)
            .field("recording", &self.recording)
            .field("pending_barriers", &self.barriers.len())
            .finish_non_exhaustive()
    }
}

fn heap_slot(heap_type: DescriptorHeapType) -> Result<usize, GraphicsError> {
    match heap_type {
        DescriptorHeapType::CbvSrvUav => Ok(0),
        DescriptorHeapType::Sampler => Ok(1),
        DescriptorHeapType::Rtv | DescriptorHeapType::Dsv => Err(GraphicsError::InvalidParameter(
            format!("{heap_type:?} heaps cannot be bound to a command list"),
        )),
    }
}

fn missing_resource() -> GraphicsError {
    GraphicsError::InvalidParameter("resource has not been created".to_string())
}

/// A command context that is currently recording.
pub struct CommandContext {
    device: Arc<GraphicsDevice>,
    state: Box<ContextState>,
}

impl CommandContext {
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        state: Box<ContextState>,
        label: &str,
    ) -> Result<Self, GraphicsError> {
        let mut context = Self { device, state };
        context.state.label = label.to_string();
        if !label.is_empty() {
            context.begin_event(label)?;
        }
        Ok(context)
    }

    /// Pool id of the underlying context. Stable across reuse.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn queue_type(&self) -> QueueType {
        self.state.queue_type
    }

    pub fn label(&self) -> &str {
        &self.state.label
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Command list being recorded.
    pub fn command_list(&self) -> RawCommandList {
        self.state.list
    }

    pub(crate) fn record(&self, command: Command) -> Result<(), GraphicsError> {
        self.state.backend.record(self.state.list, command)
    }

    // --- Debug markers ---------------------------------------------------

    /// Open a named event region. No-op unless debug markers are enabled.
    pub fn begin_event(&mut self, label: &str) -> Result<(), GraphicsError> {
        if !self.device.config().debug_markers {
            return Ok(());
        }
        self.record(Command::BeginEvent(label.to_string()))?;
        self.state.open_events.push(label.to_string());
        Ok(())
    }

    /// Close the innermost event region.
    pub fn end_event(&mut self) -> Result<(), GraphicsError> {
        if self.state.open_events.is_empty() {
            return Ok(());
        }
        self.record(Command::EndEvent)?;
        self.state.open_events.pop();
        Ok(())
    }

    pub fn set_marker(&mut self, label: &str) -> Result<(), GraphicsError> {
        if !self.device.config().debug_markers {
            return Ok(());
        }
        self.record(Command::SetMarker(label.to_string()))
    }

    // --- Barriers ----------------------------------------------------------

    fn check_queue_state(&self, state: ResourceState) {
        match self.state.queue_type {
            QueueType::Compute => debug_assert!(
                state.is_compute_queue_compatible(),
                "{state:?} is not a valid state on a compute queue"
            ),
            QueueType::Copy => debug_assert!(
                state.is_copy_queue_compatible(),
                "{state:?} is not a valid state on a copy queue"
            ),
            QueueType::Graphics => {}
        }
    }

    fn push_barrier(&mut self, barrier: ResourceBarrier, flush_immediate: bool) -> Result<(), GraphicsError> {
        self.state.barriers.push(barrier);
        if flush_immediate || self.state.barriers.is_full() {
            self.flush_resource_barriers()?;
        }
        Ok(())
    }

    /// Move `resource` into `new_state`.
    ///
    /// Nothing is recorded when the resource is already in `new_state`,
    /// except for unordered access, which gets a UAV barrier instead. When a
    /// split transition to `new_state` was begun, only its end half is
    /// recorded.
    pub fn transition_resource(
        &mut self,
        resource: &mut GpuResource,
        new_state: ResourceState,
        flush_immediate: bool,
    ) -> Result<(), GraphicsError> {
        let raw = resource.raw().ok_or_else(missing_resource)?;
        let old_state = resource.usage_state();
        self.check_queue_state(old_state);
        self.check_queue_state(new_state);

        if old_state != new_state {
            let split = if resource.transitioning_state() == Some(new_state) {
                resource.set_transitioning_state(None);
                BarrierSplit::EndOnly
            } else {
                BarrierSplit::None
            };
            resource.set_usage_state(new_state);
            self.push_barrier(
                ResourceBarrier::Transition {
                    resource: raw,
                    before: old_state,
                    after: new_state,
                    split,
                },
                flush_immediate,
            )
        } else if new_state == ResourceState::UNORDERED_ACCESS {
            self.insert_uav_barrier(resource, flush_immediate)
        } else if flush_immediate {
            self.flush_resource_barriers()
        } else {
            Ok(())
        }
    }

    /// Record the begin half of a split transition to `new_state`.
    ///
    /// The usage state does not change until the matching
    /// [`transition_resource`](Self::transition_resource) records the end half.
    pub fn begin_resource_transition(
        &mut self,
        resource: &mut GpuResource,
        new_state: ResourceState,
        flush_immediate: bool,
    ) -> Result<(), GraphicsError> {
        // A pending split transition is completed before another begins.
        if let Some(pending) = resource.transitioning_state() {
            self.transition_resource(resource, pending, false)?;
        }
        let raw = resource.raw().ok_or_else(missing_resource)?;
        let old_state = resource.usage_state();
        if old_state != new_state {
            resource.set_transitioning_state(Some(new_state));
            self.push_barrier(
                ResourceBarrier::Transition {
                    resource: raw,
                    before: old_state,
                    after: new_state,
                    split: BarrierSplit::BeginOnly,
                },
                flush_immediate,
            )
        } else if flush_immediate {
            self.flush_resource_barriers()
        } else {
            Ok(())
        }
    }

    /// Order unordered-access writes to `resource` before later accesses.
    pub fn insert_uav_barrier(
        &mut self,
        resource: &GpuResource,
        flush_immediate: bool,
    ) -> Result<(), GraphicsError> {
        let raw = resource.raw().ok_or_else(missing_resource)?;
        self.push_barrier(ResourceBarrier::Uav { resource: Some(raw) }, flush_immediate)
    }

    /// Switch which of two placed resources owns their shared memory.
    pub fn insert_alias_barrier(
        &mut self,
        before: Option<&GpuResource>,
        after: Option<&GpuResource>,
        flush_immediate: bool,
    ) -> Result<(), GraphicsError> {
        self.push_barrier(
            ResourceBarrier::Aliasing {
                before: before.and_then(GpuResource::raw),
                after: after.and_then(GpuResource::raw),
            },
            flush_immediate,
        )
    }

    /// Record every pending barrier in one call.
    pub fn flush_resource_barriers(&mut self) -> Result<(), GraphicsError> {
        if self.state.barriers.is_empty() {
            return Ok(());
        }
        let barriers = self.state.barriers.take();
        self.record(Command::ResourceBarrier(barriers))
    }

    /// Barriers waiting for the next flush.
    pub fn pending_barrier_count(&self) -> usize {
        self.state.barriers.len()
    }

    // --- Binding -----------------------------------------------------------

    fn bind_descriptor_heaps(&self) -> Result<(), GraphicsError> {
        let heaps: Vec<RawDescriptorHeap> =
            self.state.bound.descriptor_heaps.iter().flatten().copied().collect();
        if heaps.is_empty() {
            return Ok(());
        }
        self.record(Command::SetDescriptorHeaps(heaps))
    }

    /// Bind a shader-visible heap. Binding the heap already bound is a no-op.
    pub fn set_descriptor_heap(
        &mut self,
        heap_type: DescriptorHeapType,
        heap: RawDescriptorHeap,
    ) -> Result<(), GraphicsError> {
        let slot = heap_slot(heap_type)?;
        if self.state.bound.descriptor_heaps[slot] == Some(heap) {
            return Ok(());
        }
        self.state.bound.descriptor_heaps[slot] = Some(heap);
        self.bind_descriptor_heaps()
    }

    /// Bind several heaps with a single call, skipping it when nothing changes.
    pub fn set_descriptor_heaps(
        &mut self,
        heaps: &[(DescriptorHeapType, RawDescriptorHeap)],
    ) -> Result<(), GraphicsError> {
        let mut changed = false;
        for &(heap_type, heap) in heaps {
            let slot = heap_slot(heap_type)?;
            if self.state.bound.descriptor_heaps[slot] != Some(heap) {
                self.state.bound.descriptor_heaps[slot] = Some(heap);
                changed = true;
            }
        }
        if changed {
            self.bind_descriptor_heaps()?;
        }
        Ok(())
    }

    /// Currently bound heap of the given type.
    pub fn bound_descriptor_heap(&self, heap_type: DescriptorHeapType) -> Option<RawDescriptorHeap> {
        heap_slot(heap_type)
            .ok()
            .and_then(|slot| self.state.bound.descriptor_heaps[slot])
    }

    pub(crate) fn set_pipeline_state_raw(
        &mut self,
        pipeline: RawPipelineState,
    ) -> Result<(), GraphicsError> {
        if self.state.bound.pipeline_state == Some(pipeline) {
            return Ok(());
        }
        self.record(Command::SetPipelineState(pipeline))?;
        self.state.bound.pipeline_state = Some(pipeline);
        Ok(())
    }

    pub fn bound_pipeline_state(&self) -> Option<RawPipelineState> {
        self.state.bound.pipeline_state
    }

    pub fn bound_root_signature(&self, bind_point: BindPoint) -> Option<&RootSignature> {
        match bind_point {
            BindPoint::Graphics => self.state.bound.graphics_root_signature.as_ref(),
            BindPoint::Compute => self.state.bound.compute_root_signature.as_ref(),
        }
    }

    pub(crate) fn set_root_signature_at(
        &mut self,
        bind_point: BindPoint,
        root_signature: &RootSignature,
    ) -> Result<(), GraphicsError> {
        if self.bound_root_signature(bind_point) == Some(root_signature) {
            return Ok(());
        }
        self.record(Command::SetRootSignature(bind_point, root_signature.raw()))?;
        let state = &mut *self.state;
        state.view_heap.parse_root_signature(bind_point, root_signature);
        state.sampler_heap.parse_root_signature(bind_point, root_signature);
        match bind_point {
            BindPoint::Graphics => state.bound.graphics_root_signature = Some(root_signature.clone()),
            BindPoint::Compute => state.bound.compute_root_signature = Some(root_signature.clone()),
        }
        Ok(())
    }

    /// Stage CPU descriptors into a descriptor table of the bound root
    /// signature. They are copied and bound before the next draw or dispatch.
    pub(crate) fn set_dynamic_descriptors_at(
        &mut self,
        bind_point: BindPoint,
        heap_type: DescriptorHeapType,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        if handles.is_empty() {
            return Ok(());
        }
        match heap_slot(heap_type)? {
            0 => self
                .state
                .view_heap
                .set_descriptor_handles(bind_point, root_index, offset, handles),
            _ => self
                .state
                .sampler_heap
                .set_descriptor_handles(bind_point, root_index, offset, handles),
        }
    }

    /// Copy stale descriptor tables into the shader-visible heaps and bind them.
    pub(crate) fn commit_descriptor_tables(&mut self, bind_point: BindPoint) -> Result<(), GraphicsError> {
        if let Some(heap) = self.state.view_heap.prepare_commit(bind_point)? {
            self.set_descriptor_heap(DescriptorHeapType::CbvSrvUav, heap)?;
        }
        if let Some(heap) = self.state.sampler_heap.prepare_commit(bind_point)? {
            self.set_descriptor_heap(DescriptorHeapType::Sampler, heap)?;
        }
        let list = self.state.list;
        self.state.view_heap.commit(bind_point, list)?;
        self.state.sampler_heap.commit(bind_point, list)
    }

    /// Barriers and descriptor tables every draw or dispatch depends on.
    pub(crate) fn prepare_work(&mut self, bind_point: BindPoint) -> Result<(), GraphicsError> {
        self.flush_resource_barriers()?;
        self.commit_descriptor_tables(bind_point)
    }

    /// Copy a CPU descriptor into this context's shader-visible heap and bind
    /// that heap. The handle is valid until the context finishes.
    pub fn upload_descriptor(
        &mut self,
        heap_type: DescriptorHeapType,
        handle: CpuDescriptorHandle,
    ) -> Result<GpuDescriptorHandle, GraphicsError> {
        let uploaded = match heap_slot(heap_type)? {
            0 => self.state.view_heap.upload_direct(handle)?,
            _ => self.state.sampler_heap.upload_direct(handle)?,
        };
        self.set_descriptor_heap(heap_type, uploaded.heap)?;
        Ok(uploaded.gpu)
    }

    // --- Transient memory ----------------------------------------------------

    /// CPU-writable memory valid until this context's work completes.
    pub fn allocate_upload_memory(&mut self, size: u64) -> Result<DynAlloc, GraphicsError> {
        self.state
            .cpu_linear
            .allocate(size, LinearAllocator::DEFAULT_ALIGNMENT)
    }

    /// CPU-writable memory with a caller-chosen alignment.
    pub fn allocate_upload_memory_aligned(
        &mut self,
        size: u64,
        alignment: u64,
    ) -> Result<DynAlloc, GraphicsError> {
        self.state.cpu_linear.allocate(size, alignment)
    }

    /// GPU-exclusive scratch memory valid until this context's work completes.
    pub fn allocate_scratch_memory(
        &mut self,
        size: u64,
        alignment: u64,
    ) -> Result<DynAlloc, GraphicsError> {
        self.state.gpu_linear.allocate(size, alignment)
    }

    /// Copy `data` into fresh upload memory.
    pub fn upload_bytes(&mut self, data: &[u8]) -> Result<DynAlloc, GraphicsError> {
        let alloc = self.allocate_upload_memory(data.len() as u64)?;
        alloc.write_bytes(self.state.backend.as_ref(), 0, data)?;
        Ok(alloc)
    }

    /// Copy plain data into fresh upload memory.
    pub fn upload<T: bytemuck::Pod>(&mut self, data: &[T]) -> Result<DynAlloc, GraphicsError> {
        self.upload_bytes(bytemuck::cast_slice(data))
    }

    // --- Copies --------------------------------------------------------------

    /// Copy all of `src` into `dest`.
    pub fn copy_buffer(
        &mut self,
        dest: &mut GpuResource,
        src: &mut GpuResource,
    ) -> Result<(), GraphicsError> {
        self.copy_resource(dest, src)
    }

    pub fn copy_resource(
        &mut self,
        dest: &mut GpuResource,
        src: &mut GpuResource,
    ) -> Result<(), GraphicsError> {
        self.transition_resource(dest, ResourceState::COPY_DEST, false)?;
        self.transition_resource(src, ResourceState::COPY_SOURCE, false)?;
        self.flush_resource_barriers()?;
        let dest = dest.raw().ok_or_else(missing_resource)?;
        let src = src.raw().ok_or_else(missing_resource)?;
        self.record(Command::CopyResource { dest, src })
    }

    pub fn copy_buffer_region(
        &mut self,
        dest: &mut GpuResource,
        dest_offset: u64,
        src: &mut GpuResource,
        src_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        self.transition_resource(dest, ResourceState::COPY_DEST, false)?;
        self.transition_resource(src, ResourceState::COPY_SOURCE, false)?;
        self.flush_resource_barriers()?;
        let dest = dest.raw().ok_or_else(missing_resource)?;
        let src = src.raw().ok_or_else(missing_resource)?;
        self.record(Command::CopyBufferRegion {
            dest,
            dest_offset,
            src,
            src_offset,
            size,
        })
    }

    /// Copy from transient upload memory into `dest`.
    pub fn copy_from_upload(
        &mut self,
        dest: &mut GpuResource,
        dest_offset: u64,
        upload: &DynAlloc,
        size: u64,
    ) -> Result<(), GraphicsError> {
        if size > upload.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "copy of {size} bytes exceeds a {} byte upload allocation",
                upload.size()
            )));
        }
        self.transition_resource(dest, ResourceState::COPY_DEST, true)?;
        let dest = dest.raw().ok_or_else(missing_resource)?;
        self.record(Command::CopyBufferRegion {
            dest,
            dest_offset,
            src: upload.resource(),
            src_offset: upload.offset(),
            size,
        })
    }

    /// Copy `src` into a readback buffer. The bytes are readable once this
    /// context's fence completes.
    pub fn readback_buffer(
        &mut self,
        dest: &mut ReadbackBuffer,
        src: &mut GpuResource,
    ) -> Result<(), GraphicsError> {
        let size = dest.buffer_size();
        self.copy_buffer_region(dest, 0, src, 0, size)
    }

    /// Fill `dest` from `data` through upload memory on a graphics context
    /// and wait for the copy. `dest` ends in `GENERIC_READ`.
    pub fn initialize_buffer(
        device: &Arc<GraphicsDevice>,
        dest: &mut GpuResource,
        data: &[u8],
        dest_offset: u64,
    ) -> Result<u64, GraphicsError> {
        let mut context = device.begin_graphics("Initialize buffer")?;
        let upload = context.upload_bytes(data)?;
        context.copy_from_upload(dest, dest_offset, &upload, data.len() as u64)?;
        context.transition_resource(dest, ResourceState::GENERIC_READ, true)?;
        context.finish(true)
    }

    // --- Submission ------------------------------------------------------------

    /// Submit what has been recorded and keep recording.
    ///
    /// The list is re-opened on the same allocator and the bound root
    /// signatures, pipeline state and descriptor heaps are bound again.
    pub fn flush(&mut self, wait_for_completion: bool) -> Result<u64, GraphicsError> {
        profile_scope!("CommandContext::flush");
        self.flush_resource_barriers()?;
        for _ in &self.state.open_events {
            self.record(Command::EndEvent)?;
        }
        let queue = self.device.commands().queue(self.state.queue_type);
        let fence = queue.execute_command_list(self.state.list)?;
        if wait_for_completion {
            queue.wait_for_fence(fence)?;
        }
        self.state
            .backend
            .reset_command_list(self.state.list, self.state.allocator)?;

        if let Some(rs) = &self.state.bound.graphics_root_signature {
            self.record(Command::SetRootSignature(BindPoint::Graphics, rs.raw()))?;
        }
        if let Some(rs) = &self.state.bound.compute_root_signature {
            self.record(Command::SetRootSignature(BindPoint::Compute, rs.raw()))?;
        }
        if let Some(pipeline) = self.state.bound.pipeline_state {
            self.record(Command::SetPipelineState(pipeline))?;
        }
        self.bind_descriptor_heaps()?;
        for label in &self.state.open_events {
            self.record(Command::BeginEvent(label.clone()))?;
        }
        self.state.view_heap.invalidate_bound_tables();
        self.state.sampler_heap.invalidate_bound_tables();
        log::trace!("Flushed {:?} at fence {fence:#x}", self.state.label);
        Ok(fence)
    }

    fn submit(&mut self, wait_for_completion: bool) -> Result<u64, GraphicsError> {
        while !self.state.open_events.is_empty() {
            self.end_event()?;
        }
        self.flush_resource_barriers()?;
        let commands = self.device.commands();
        let fence = commands
            .queue(self.state.queue_type)
            .execute_command_list(self.state.list)?;
        self.state.retire(fence);
        if wait_for_completion {
            commands.wait_for_fence(fence)?;
        }
        Ok(fence)
    }

    /// Submit the context and return it to the pool.
    ///
    /// Everything the context allocated is retired against the returned
    /// fence value. With `wait_for_completion` the call blocks until the GPU
    /// has executed the work.
    pub fn finish(mut self, wait_for_completion: bool) -> Result<u64, GraphicsError> {
        profile_scope!("CommandContext::finish");
        let result = self.submit(wait_for_completion);
        let CommandContext { device, state } = self;
        if !state.recording {
            device.contexts().free(state);
        }
        result
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("label", &self.state.label)
            .field("state", &self.state)
            .finish()
    }
}

static_assertions::assert_impl_all!(CommandContext: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::command::MAX_PENDING_BARRIERS;
    use crate::config::GraphicsConfig;
    use crate::resources::{BufferKind, GpuBuffer};

    fn device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let device =
            GraphicsDevice::with_backend(backend.clone(), GraphicsConfig::default()).unwrap();
        (backend, device)
    }

    fn buffer(device: &Arc<GraphicsDevice>, label: &str) -> GpuBuffer {
        let mut buffer = GpuBuffer::new(BufferKind::ByteAddress);
        buffer.create(device, label, 64, 4, None).unwrap();
        buffer
    }

    #[test]
    fn test_repeated_transition_records_one_barrier() {
        let (backend, device) = device();
        let mut target = buffer(&device, "Target");
        let mut ctx = device.begin_graphics("").unwrap();
        ctx.transition_resource(&mut target, ResourceState::COPY_DEST, false)
            .unwrap();
        ctx.transition_resource(&mut target, ResourceState::COPY_DEST, false)
            .unwrap();
        assert_eq!(ctx.pending_barrier_count(), 1);
        ctx.finish(false).unwrap();

        let lists = backend.executed_lists();
        assert_eq!(lists.last().unwrap().barrier_count(), 1);
        assert_eq!(target.usage_state(), ResourceState::COPY_DEST);
    }

    #[test]
    fn test_unordered_access_rebarrier() {
        let (_backend, device) = device();
        let mut target = buffer(&device, "Scratch");
        let mut ctx = device.begin_compute("").unwrap();
        ctx.transition_resource(&mut target, ResourceState::UNORDERED_ACCESS, false)
            .unwrap();
        ctx.transition_resource(&mut target, ResourceState::UNORDERED_ACCESS, false)
            .unwrap();
        assert_eq!(ctx.pending_barrier_count(), 2);
        ctx.finish(false).unwrap();
    }

    #[test]
    fn test_split_transition_records_end_half() {
        let (backend, device) = device();
        let mut target = buffer(&device, "Split");
        let mut ctx = device.begin_graphics("").unwrap();
        ctx.begin_resource_transition(&mut target, ResourceState::GENERIC_READ, false)
            .unwrap();
        assert_eq!(target.usage_state(), ResourceState::COMMON);
        assert_eq!(target.transitioning_state(), Some(ResourceState::GENERIC_READ));
        ctx.transition_resource(&mut target, ResourceState::GENERIC_READ, false)
            .unwrap();
        assert_eq!(target.transitioning_state(), None);
        ctx.finish(false).unwrap();

        let lists = backend.executed_lists();
        let splits: Vec<BarrierSplit> = lists
            .last()
            .unwrap()
            .barriers()
            .filter_map(|barrier| match barrier {
                ResourceBarrier::Transition { split, .. } => Some(*split),
                _ => None,
            })
            .collect();
        assert_eq!(splits, vec![BarrierSplit::BeginOnly, BarrierSplit::EndOnly]);
    }

    #[test]
    fn test_barriers_flush_at_capacity() {
        let (_backend, device) = device();
        let mut targets: Vec<GpuBuffer> = (0..=MAX_PENDING_BARRIERS)
            .map(|i| buffer(&device, &format!("Target {i}")))
            .collect();
        let mut ctx = device.begin_graphics("").unwrap();
        for target in &mut targets {
            ctx.transition_resource(target, ResourceState::COPY_DEST, false)
                .unwrap();
        }
        assert_eq!(ctx.pending_barrier_count(), 1);
        ctx.finish(false).unwrap();
    }

    #[test]
    fn test_copy_on_missing_resource_fails() {
        let (_backend, device) = device();
        let mut created = buffer(&device, "Created");
        let mut missing = GpuResource::new();
        let mut ctx = device.begin_copy("").unwrap();
        assert!(matches!(
            ctx.copy_resource(&mut created, &mut missing),
            Err(GraphicsError::InvalidParameter(_))
        ));
        ctx.finish(false).unwrap();
    }

    #[test]
    fn test_abandoned_context_retires_allocator() {
        let (_backend, device) = device();
        let ctx = device.begin_graphics("Abandoned").unwrap();
        drop(ctx);

        let queue = device.commands().graphics_queue();
        assert_eq!(queue.allocator_pool().retired_count(), 1);
        assert_eq!(device.contexts().available(QueueType::Graphics), 0);
        device.idle_gpu().unwrap();
    }

    #[test]
    fn test_label_opens_and_closes_event() {
        let backend = Arc::new(DummyBackend::new());
        let config = GraphicsConfig::default().with_debug_markers(true);
        let device = GraphicsDevice::with_backend(backend.clone(), config).unwrap();
        let mut ctx = device.begin_graphics("Shadows").unwrap();
        ctx.set_marker("Cascade 0").unwrap();
        ctx.finish(false).unwrap();

        let commands = backend.executed_lists().last().unwrap().commands.clone();
        assert_eq!(
            commands,
            vec![
                Command::BeginEvent("Shadows".to_string()),
                Command::SetMarker("Cascade 0".to_string()),
                Command::EndEvent,
            ]
        );
    }

    #[test]
    fn test_flush_balances_open_events() {
        let backend = Arc::new(DummyBackend::new());
        let config = GraphicsConfig::default().with_debug_markers(true);
        let device = GraphicsDevice::with_backend(backend.clone(), config).unwrap();
        let mut ctx = device.begin_graphics("Frame").unwrap();
        ctx.begin_event("Lighting").unwrap();
        ctx.flush(false).unwrap();
        ctx.set_marker("Resume").unwrap();
        ctx.finish(false).unwrap();

        let lists = backend.executed_lists();
        let [.., flushed, finished] = lists.as_slice() else {
            panic!("expected two submissions, got {}", lists.len());
        };
        assert_eq!(
            flushed.commands,
            vec![
                Command::BeginEvent("Frame".to_string()),
                Command::BeginEvent("Lighting".to_string()),
                Command::EndEvent,
                Command::EndEvent,
            ]
        );
        assert_eq!(
            finished.commands,
            vec![
                Command::BeginEvent("Frame".to_string()),
                Command::BeginEvent("Lighting".to_string()),
                Command::SetMarker("Resume".to_string()),
                Command::EndEvent,
                Command::EndEvent,
            ]
        );
    }

    #[test]
    fn test_markers_disabled() {
        let backend = Arc::new(DummyBackend::new());
        let config = GraphicsConfig::default().with_debug_markers(false);
        let device = GraphicsDevice::with_backend(backend.clone(), config).unwrap();
        let mut ctx = device.begin_graphics("Shadows").unwrap();
        ctx.end_event().unwrap();
        ctx.finish(false).unwrap();
        assert!(backend.executed_lists().last().unwrap().commands.is_empty());
    }

    #[test]
    fn test_upload_memory_is_aligned() {
        let (_backend, device) = device();
        let mut ctx = device.begin_graphics("").unwrap();
        let a = ctx.upload_bytes(&[1, 2, 3]).unwrap();
        let b = ctx.upload::<u32>(&[7, 8]).unwrap();
        assert_eq!(a.offset() % LinearAllocator::DEFAULT_ALIGNMENT, 0);
        assert_eq!(b.offset() % LinearAllocator::DEFAULT_ALIGNMENT, 0);
        assert!(b.offset() >= a.offset() + a.size());
        ctx.finish(false).unwrap();
    }
}
