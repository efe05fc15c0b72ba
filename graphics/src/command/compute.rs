//! Compute command context and the compute recording surface.

use std::ops::{Deref, DerefMut};

use crate::backend::{BindPoint, Command};
use crate::command::{CommandContext, GraphicsContext};
use crate::error::GraphicsError;
use crate::pipeline::{ComputePso, RootSignature};
use crate::types::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};

mod private {
    pub trait Sealed {
        fn base_mut(&mut self) -> &mut super::CommandContext;
    }
}

/// Compute recording, available on both compute and graphics contexts.
pub trait ComputeCommands: private::Sealed {
    fn set_compute_root_signature(
        &mut self,
        root_signature: &RootSignature,
    ) -> Result<(), GraphicsError> {
        self.base_mut()
            .set_root_signature_at(BindPoint::Compute, root_signature)
    }

    fn set_compute_pipeline_state(&mut self, pso: &ComputePso) -> Result<(), GraphicsError> {
        self.base_mut().set_pipeline_state_raw(pso.raw())
    }

    fn set_compute_constants(
        &mut self,
        root_index: u32,
        dest_offset: u32,
        values: &[u32],
    ) -> Result<(), GraphicsError> {
        self.base_mut().record(Command::SetRootConstants {
            bind_point: BindPoint::Compute,
            root_index,
            dest_offset,
            values: values.to_vec(),
        })
    }

    fn set_compute_constant_buffer(
        &mut self,
        root_index: u32,
        address: u64,
    ) -> Result<(), GraphicsError> {
        self.base_mut().record(Command::SetRootConstantBufferView {
            bind_point: BindPoint::Compute,
            root_index,
            address,
        })
    }

    /// Copy `data` into upload memory and bind it as a compute constant buffer.
    fn set_compute_dynamic_constant_buffer_view(
        &mut self,
        root_index: u32,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let alloc = self.base_mut().upload_bytes(data)?;
        self.set_compute_constant_buffer(root_index, alloc.gpu_address())
    }

    fn set_compute_dynamic_descriptors(
        &mut self,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        self.base_mut().set_dynamic_descriptors_at(
            BindPoint::Compute,
            DescriptorHeapType::CbvSrvUav,
            root_index,
            offset,
            handles,
        )
    }

    fn set_compute_dynamic_samplers(
        &mut self,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        self.base_mut().set_dynamic_descriptors_at(
            BindPoint::Compute,
            DescriptorHeapType::Sampler,
            root_index,
            offset,
            handles,
        )
    }

    fn set_compute_descriptor_table(
        &mut self,
        root_index: u32,
        base: GpuDescriptorHandle,
    ) -> Result<(), GraphicsError> {
        self.base_mut().record(Command::SetRootDescriptorTable {
            bind_point: BindPoint::Compute,
            root_index,
            base,
        })
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), GraphicsError> {
        let base = self.base_mut();
        base.prepare_work(BindPoint::Compute)?;
        base.record(Command::Dispatch { x, y, z })
    }

    /// Dispatch enough groups of `group_size` threads to cover `threads`.
    fn dispatch_1d(&mut self, threads: u32, group_size: u32) -> Result<(), GraphicsError> {
        self.dispatch(group_count(threads, group_size)?, 1, 1)
    }

    fn dispatch_2d(
        &mut self,
        threads_x: u32,
        threads_y: u32,
        group_size_x: u32,
        group_size_y: u32,
    ) -> Result<(), GraphicsError> {
        self.dispatch(
            group_count(threads_x, group_size_x)?,
            group_count(threads_y, group_size_y)?,
            1,
        )
    }

    fn dispatch_3d(
        &mut self,
        threads: [u32; 3],
        group_size: [u32; 3],
    ) -> Result<(), GraphicsError> {
        self.dispatch(
            group_count(threads[0], group_size[0])?,
            group_count(threads[1], group_size[1])?,
            group_count(threads[2], group_size[2])?,
        )
    }
}

fn group_count(threads: u32, group_size: u32) -> Result<u32, GraphicsError> {
    if group_size == 0 {
        return Err(GraphicsError::InvalidParameter(
            "thread group size must be at least 1".to_string(),
        ));
    }
    Ok(threads.div_ceil(group_size))
}

/// A context recording on the async compute queue.
pub struct ComputeContext(CommandContext);

impl ComputeContext {
    pub(crate) fn new(context: CommandContext) -> Self {
        Self(context)
    }

    /// Submit and return the context to the pool.
    pub fn finish(self, wait_for_completion: bool) -> Result<u64, GraphicsError> {
        self.0.finish(wait_for_completion)
    }
}

impl private::Sealed for ComputeContext {
    fn base_mut(&mut self) -> &mut CommandContext {
        &mut self.0
    }
}

impl ComputeCommands for ComputeContext {}

impl private::Sealed for GraphicsContext {
    fn base_mut(&mut self) -> &mut CommandContext {
        self
    }
}

impl ComputeCommands for GraphicsContext {}

impl Deref for ComputeContext {
    type Target = CommandContext;

    fn deref(&self) -> &CommandContext {
        &self.0
    }
}

impl DerefMut for ComputeContext {
    fn deref_mut(&mut self) -> &mut CommandContext {
        &mut self.0
    }
}

impl std::fmt::Debug for ComputeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ComputeContext").field(&self.0).finish()
    }
}

static_assertions::assert_impl_all!(ComputeContext: Send);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::GraphicsConfig;
    use crate::device::GraphicsDevice;
    use crate::pipeline::{ComputePsoDesc, RootSignatureDesc, ShaderBytecode, ShaderVisibility};
    use crate::types::{QueueType, queue_type_from_fence};

    fn device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let config = GraphicsConfig::default().with_debug_markers(false);
        let device = GraphicsDevice::with_backend(backend.clone(), config).unwrap();
        (backend, device)
    }

    #[test]
    fn test_dispatch_rounds_up_groups() {
        let (backend, device) = device();
        let mut ctx = device.begin_compute("").unwrap();
        ctx.dispatch_1d(100, 64).unwrap();
        ctx.dispatch_2d(1920, 1080, 8, 8).unwrap();
        ctx.dispatch_3d([33, 1, 9], [32, 1, 4]).unwrap();
        let fence = ctx.finish(false).unwrap();

        assert_eq!(queue_type_from_fence(fence), Some(QueueType::Compute));
        let commands = backend.executed_lists().last().unwrap().commands.clone();
        assert_eq!(
            commands,
            vec![
                Command::Dispatch { x: 2, y: 1, z: 1 },
                Command::Dispatch { x: 240, y: 135, z: 1 },
                Command::Dispatch { x: 2, y: 1, z: 3 },
            ]
        );
    }

    #[test]
    fn test_zero_group_size_rejected() {
        let (backend, device) = device();
        let mut ctx = device.begin_compute("").unwrap();
        assert!(matches!(
            ctx.dispatch_1d(100, 0),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(ctx.dispatch_2d(16, 16, 8, 0).is_err());
        assert!(ctx.dispatch_3d([4, 4, 4], [4, 0, 4]).is_err());
        ctx.finish(false).unwrap();

        let commands = backend.executed_lists().last().unwrap().commands.clone();
        assert!(commands.is_empty());
    }

    #[test]
    fn test_graphics_context_dispatches() {
        let (backend, device) = device();
        let rs = device
            .create_root_signature(
                &RootSignatureDesc::new("Cull").with_constants(0, 4, ShaderVisibility::All),
            )
            .unwrap();
        let pso = device
            .create_compute_pso(
                ComputePsoDesc::new("Cull")
                    .with_root_signature(&rs)
                    .with_compute_shader(ShaderBytecode::new(vec![9u8; 4])),
            )
            .unwrap();

        let mut ctx = device.begin_graphics("").unwrap();
        ctx.set_compute_root_signature(&rs).unwrap();
        ctx.set_compute_pipeline_state(&pso).unwrap();
        ctx.set_compute_constants(0, 0, &[1, 2]).unwrap();
        ctx.dispatch(4, 1, 1).unwrap();
        assert!(ctx.bound_root_signature(BindPoint::Compute).is_some());
        assert!(ctx.bound_root_signature(BindPoint::Graphics).is_none());
        let fence = ctx.finish(false).unwrap();

        assert_eq!(queue_type_from_fence(fence), Some(QueueType::Graphics));
        assert_eq!(backend.stats().dispatches, 1);
    }
}
