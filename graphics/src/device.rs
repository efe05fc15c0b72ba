//! Graphics device.
//!
//! The [`GraphicsDevice`] is the runtime object everything else hangs off: it
//! owns the backend, the three queues, the context pool, the descriptor
//! allocators, the transient page managers and the pipeline caches. It is
//! shared as an `Arc` and every recording context holds a reference to it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, RawPipelineState, create_backend};
use crate::command::{
    CommandContext, CommandListManager, ComputeContext, ContextManager, CopyContext,
    GraphicsContext,
};
use crate::config::GraphicsConfig;
use crate::error::GraphicsError;
use crate::memory::{
    DescriptorAllocator, DescriptorHeapPool, LinearAllocatorPageManager, LinearAllocatorType,
};
use crate::pipeline::{
    ComputePso, ComputePsoDesc, GraphicsPso, GraphicsPsoDesc, PipelineStateDesc, RootSignature,
    RootSignatureDesc,
};
use crate::types::{CpuDescriptorHandle, DescriptorHeapType, QueueType};

/// The GPU runtime.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync`. Contexts can be begun and finished from
/// any thread; each pool it owns is guarded by its own mutex.
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::new(GraphicsConfig::default())?;
///
/// let mut ctx = device.begin_graphics("Upload")?;
/// ctx.copy_buffer(&mut dest, &mut src)?;
/// let fence = ctx.finish(false)?;
/// device.wait_for_fence(fence)?;
/// ```
pub struct GraphicsDevice {
    config: GraphicsConfig,
    backend: Arc<dyn GpuBackend>,
    commands: Arc<CommandListManager>,
    contexts: ContextManager,
    descriptor_allocators: [DescriptorAllocator; 4],
    cpu_pages: Arc<LinearAllocatorPageManager>,
    gpu_pages: Arc<LinearAllocatorPageManager>,
    view_heaps: Arc<DescriptorHeapPool>,
    sampler_heaps: Arc<DescriptorHeapPool>,
    root_signatures: Mutex<HashMap<RootSignatureDesc, RootSignature>>,
    pipeline_states: Mutex<HashMap<PipelineStateDesc, RawPipelineState>>,
}

impl GraphicsDevice {
    /// Create a device on the default backend.
    pub fn new(config: GraphicsConfig) -> Result<Arc<Self>, GraphicsError> {
        config.validate()?;
        Self::with_backend(create_backend()?, config)
    }

    /// Create a device on an explicit backend.
    pub fn with_backend(
        backend: Arc<dyn GpuBackend>,
        config: GraphicsConfig,
    ) -> Result<Arc<Self>, GraphicsError> {
        config.validate()?;
        let commands = Arc::new(CommandListManager::new(backend.clone())?);
        let descriptor_allocators = DescriptorHeapType::ALL.map(|heap_type| {
            DescriptorAllocator::new(backend.clone(), heap_type, config.descriptors_per_static_heap)
        });
        let cpu_pages = Arc::new(LinearAllocatorPageManager::new(
            backend.clone(),
            commands.clone(),
            LinearAllocatorType::CpuWritable,
            config.cpu_page_size,
        ));
        let gpu_pages = Arc::new(LinearAllocatorPageManager::new(
            backend.clone(),
            commands.clone(),
            LinearAllocatorType::GpuExclusive,
            config.gpu_page_size,
        ));
        let view_heaps = Arc::new(DescriptorHeapPool::new(
            backend.clone(),
            commands.clone(),
            DescriptorHeapType::CbvSrvUav,
            config.descriptors_per_dynamic_heap,
        ));
        let sampler_heaps = Arc::new(DescriptorHeapPool::new(
            backend.clone(),
            commands.clone(),
            DescriptorHeapType::Sampler,
            config.descriptors_per_dynamic_heap,
        ));

        log::info!(
            "{}: graphics device created on {}",
            config.app_name,
            backend.name()
        );

        Ok(Arc::new(Self {
            config,
            backend,
            commands,
            contexts: ContextManager::new(),
            descriptor_allocators,
            cpu_pages,
            gpu_pages,
            view_heaps,
            sampler_heaps,
            root_signatures: Mutex::new(HashMap::new()),
            pipeline_states: Mutex::new(HashMap::new()),
        }))
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// The graphics, compute and copy queues.
    pub fn commands(&self) -> &Arc<CommandListManager> {
        &self.commands
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    pub fn cpu_page_manager(&self) -> &Arc<LinearAllocatorPageManager> {
        &self.cpu_pages
    }

    pub fn gpu_page_manager(&self) -> &Arc<LinearAllocatorPageManager> {
        &self.gpu_pages
    }

    pub fn view_heap_pool(&self) -> &Arc<DescriptorHeapPool> {
        &self.view_heaps
    }

    pub fn sampler_heap_pool(&self) -> &Arc<DescriptorHeapPool> {
        &self.sampler_heaps
    }

    pub fn descriptor_allocator(&self, heap_type: DescriptorHeapType) -> &DescriptorAllocator {
        &self.descriptor_allocators[heap_type.index()]
    }

    // --- Contexts ----------------------------------------------------------

    fn begin(self: &Arc<Self>, queue_type: QueueType, label: &str) -> Result<CommandContext, GraphicsError> {
        let state = self.contexts.allocate(self, queue_type)?;
        CommandContext::new(self.clone(), state, label)
    }

    /// Begin recording on the graphics queue.
    pub fn begin_graphics(self: &Arc<Self>, label: &str) -> Result<GraphicsContext, GraphicsError> {
        self.begin(QueueType::Graphics, label).map(GraphicsContext::new)
    }

    /// Begin recording on the async compute queue.
    pub fn begin_compute(self: &Arc<Self>, label: &str) -> Result<ComputeContext, GraphicsError> {
        self.begin(QueueType::Compute, label).map(ComputeContext::new)
    }

    /// Begin recording on the copy queue.
    pub fn begin_copy(self: &Arc<Self>, label: &str) -> Result<CopyContext, GraphicsError> {
        self.begin(QueueType::Copy, label).map(CopyContext::new)
    }

    // --- Descriptors and pipeline objects ------------------------------------

    /// Allocate `count` contiguous CPU descriptors that live as long as the
    /// device.
    pub fn allocate_descriptor(
        &self,
        heap_type: DescriptorHeapType,
        count: u32,
    ) -> Result<CpuDescriptorHandle, GraphicsError> {
        self.descriptor_allocators[heap_type.index()].allocate(count)
    }

    /// Finalize a root signature. Identical descriptions share one object.
    pub fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<RootSignature, GraphicsError> {
        let mut cache = self.root_signatures.lock();
        if let Some(existing) = cache.get(desc) {
            return Ok(existing.clone());
        }
        let layout = desc.layout()?;
        let raw = self.backend.create_root_signature(desc)?;
        log::debug!(
            "Created root signature {:?} with {} parameters",
            desc.label,
            desc.parameters.len()
        );
        let root_signature = RootSignature::new(raw, desc.clone(), layout);
        cache.insert(desc.clone(), root_signature.clone());
        Ok(root_signature)
    }

    fn create_pipeline_state(&self, desc: PipelineStateDesc) -> Result<RawPipelineState, GraphicsError> {
        let has_root_signature = match &desc {
            PipelineStateDesc::Graphics(d) => d.root_signature.is_some(),
            PipelineStateDesc::Compute(d) => d.root_signature.is_some(),
        };
        if !has_root_signature {
            return Err(GraphicsError::InvalidParameter(format!(
                "pipeline {:?} has no root signature",
                desc.label()
            )));
        }

        let mut cache = self.pipeline_states.lock();
        if let Some(&raw) = cache.get(&desc) {
            return Ok(raw);
        }
        let raw = self.backend.create_pipeline_state(&desc)?;
        log::debug!("Created pipeline state {:?}", desc.label());
        cache.insert(desc, raw);
        Ok(raw)
    }

    /// Finalize a graphics pipeline. Identical descriptions share one object.
    pub fn create_graphics_pso(&self, desc: GraphicsPsoDesc) -> Result<GraphicsPso, GraphicsError> {
        let raw = self.create_pipeline_state(PipelineStateDesc::Graphics(desc.clone()))?;
        Ok(GraphicsPso::new(raw, Arc::new(desc)))
    }

    /// Finalize a compute pipeline. Identical descriptions share one object.
    pub fn create_compute_pso(&self, desc: ComputePsoDesc) -> Result<ComputePso, GraphicsError> {
        let raw = self.create_pipeline_state(PipelineStateDesc::Compute(desc.clone()))?;
        Ok(ComputePso::new(raw, Arc::new(desc)))
    }

    // --- Synchronization -------------------------------------------------------

    pub fn is_fence_complete(&self, fence_value: u64) -> bool {
        self.commands.is_fence_complete(fence_value)
    }

    /// Block until `fence_value` completes on the queue that issued it.
    pub fn wait_for_fence(&self, fence_value: u64) -> Result<(), GraphicsError> {
        self.commands.wait_for_fence(fence_value)
    }

    /// Block until every queue has drained.
    pub fn idle_gpu(&self) -> Result<(), GraphicsError> {
        self.commands.idle_gpu()
    }

    /// Drain the GPU and release every pooled object.
    ///
    /// Contexts still recording keep working, but nothing they allocate is
    /// recycled afterwards.
    pub fn shutdown(&self) -> Result<(), GraphicsError> {
        log::info!("{}: shutting down graphics device", self.config.app_name);
        let idle = self.idle_gpu();
        self.release_all();
        idle
    }

    fn release_all(&self) {
        self.contexts.destroy_all();
        for pipeline in self.pipeline_states.lock().drain().map(|(_, raw)| raw) {
            self.backend.destroy_pipeline_state(pipeline);
        }
        for root_signature in self.root_signatures.lock().drain().map(|(_, rs)| rs) {
            self.backend.destroy_root_signature(root_signature.raw());
        }
        self.cpu_pages.destroy();
        self.gpu_pages.destroy();
        self.view_heaps.destroy();
        self.sampler_heaps.destroy();
        for allocator in &self.descriptor_allocators {
            allocator.destroy_all();
        }
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        if let Err(e) = self.idle_gpu() {
            log::error!("Failed to idle the GPU while destroying the device: {e}");
        }
        self.release_all();
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("commands", &self.commands)
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::pipeline::{ShaderBytecode, ShaderVisibility};

    fn device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let device =
            GraphicsDevice::with_backend(backend.clone(), GraphicsConfig::default()).unwrap();
        (backend, device)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GraphicsConfig::default().with_frames_in_flight(0);
        let result = GraphicsDevice::with_backend(Arc::new(DummyBackend::new()), config);
        assert!(matches!(result, Err(GraphicsError::Config(_))));
    }

    #[test]
    fn test_root_signature_deduplicated() {
        let (backend, device) = device();
        let desc = RootSignatureDesc::new("Mesh").with_constant_buffer(0, ShaderVisibility::All);
        let a = device.create_root_signature(&desc).unwrap();
        let b = device.create_root_signature(&desc).unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.live_root_signatures(), 1);
    }

    #[test]
    fn test_pso_requires_root_signature() {
        let (_backend, device) = device();
        let result = device.create_compute_pso(
            ComputePsoDesc::new("Orphan").with_compute_shader(ShaderBytecode::new(vec![1u8, 2, 3])),
        );
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_pso_deduplicated() {
        let (backend, device) = device();
        let rs = device
            .create_root_signature(&RootSignatureDesc::new("Compute"))
            .unwrap();
        let desc = ComputePsoDesc::new("Blur")
            .with_root_signature(&rs)
            .with_compute_shader(ShaderBytecode::new(vec![0u8; 16]));
        let a = device.create_compute_pso(desc.clone()).unwrap();
        let b = device.create_compute_pso(desc).unwrap();
        assert_eq!(a.raw(), b.raw());
        assert_eq!(backend.live_pipeline_states(), 1);
    }

    #[test]
    fn test_contexts_are_pooled() {
        let (_backend, device) = device();
        let ctx = device.begin_graphics("First").unwrap();
        let id = ctx.id();
        ctx.finish(false).unwrap();
        assert_eq!(device.contexts().available(QueueType::Graphics), 1);

        let ctx = device.begin_graphics("Second").unwrap();
        assert_eq!(ctx.id(), id);
        assert_eq!(device.contexts().created(QueueType::Graphics), 1);
        ctx.finish(false).unwrap();
    }

    #[test]
    fn test_drop_releases_backend_objects() {
        let (backend, device) = device();
        let ctx = device.begin_graphics("Frame").unwrap();
        ctx.finish(true).unwrap();
        device.allocate_descriptor(DescriptorHeapType::Rtv, 1).unwrap();
        drop(device);
        assert_eq!(backend.live_command_allocators(), 0);
        assert_eq!(backend.live_descriptor_heaps(), 0);
        assert_eq!(backend.live_resources(), 0);
    }
}
