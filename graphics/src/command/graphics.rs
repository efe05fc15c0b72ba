//! Graphics command context.

use std::ops::{Deref, DerefMut};

use crate::backend::{BindPoint, Command};
use crate::command::CommandContext;
use crate::error::GraphicsError;
use crate::pipeline::{GraphicsPso, RootSignature};
use crate::resources::{ColorBuffer, DepthBuffer, GpuBuffer};
use crate::types::{
    ClearFlags, CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle, IndexBufferView,
    IndexFormat, PrimitiveTopology, ResourceState, ScissorRect, VertexBufferView, Viewport,
};

/// A context recording on the graphics queue.
///
/// Graphics contexts can also dispatch compute work through
/// [`ComputeCommands`](super::ComputeCommands).
///
/// # Example
///
/// ```ignore
/// let mut ctx = device.begin_graphics("Scene")?;
/// ctx.transition_resource(&mut scene_color, ResourceState::RENDER_TARGET, false)?;
/// ctx.clear_color(&mut scene_color, None)?;
/// ctx.set_render_target(scene_color.rtv(), Some(depth.dsv()))?;
/// ctx.set_viewport_and_scissor(0, 0, width, height)?;
/// ctx.set_root_signature(&root_signature)?;
/// ctx.set_pipeline_state(&pso)?;
/// ctx.draw(3, 0)?;
/// ctx.finish(false)?;
/// ```
pub struct GraphicsContext(CommandContext);

impl GraphicsContext {
    pub(crate) fn new(context: CommandContext) -> Self {
        Self(context)
    }

    /// Submit and return the context to the pool.
    pub fn finish(self, wait_for_completion: bool) -> Result<u64, GraphicsError> {
        self.0.finish(wait_for_completion)
    }

    // --- Pipeline ----------------------------------------------------------

    pub fn set_root_signature(&mut self, root_signature: &RootSignature) -> Result<(), GraphicsError> {
        self.0.set_root_signature_at(BindPoint::Graphics, root_signature)
    }

    pub fn set_pipeline_state(&mut self, pso: &GraphicsPso) -> Result<(), GraphicsError> {
        self.0.set_pipeline_state_raw(pso.raw())
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> Result<(), GraphicsError> {
        self.0.record(Command::SetPrimitiveTopology(topology))
    }

    // --- Output merger -------------------------------------------------------

    pub fn set_render_targets(
        &mut self,
        rtvs: &[CpuDescriptorHandle],
        dsv: Option<CpuDescriptorHandle>,
    ) -> Result<(), GraphicsError> {
        self.0.record(Command::SetRenderTargets {
            rtvs: rtvs.to_vec(),
            dsv,
        })
    }

    pub fn set_render_target(
        &mut self,
        rtv: CpuDescriptorHandle,
        dsv: Option<CpuDescriptorHandle>,
    ) -> Result<(), GraphicsError> {
        self.set_render_targets(&[rtv], dsv)
    }

    /// Bind only a depth target, for depth-only passes.
    pub fn set_depth_stencil_target(&mut self, dsv: CpuDescriptorHandle) -> Result<(), GraphicsError> {
        self.set_render_targets(&[], Some(dsv))
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) -> Result<(), GraphicsError> {
        self.0.record(Command::SetViewports(viewports.to_vec()))
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), GraphicsError> {
        self.set_viewports(&[viewport])
    }

    pub fn set_scissor(&mut self, rect: ScissorRect) -> Result<(), GraphicsError> {
        self.0.record(Command::SetScissorRects(vec![rect]))
    }

    /// Viewport and scissor covering the same rectangle.
    pub fn set_viewport_and_scissor(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        let viewport = Viewport::new(x as f32, y as f32, width as f32, height as f32);
        self.set_viewport(viewport)?;
        self.set_scissor(ScissorRect::from_viewport(&viewport))
    }

    // --- Clears ----------------------------------------------------------------

    /// Clear to the buffer's clear color, optionally only inside `rect`.
    pub fn clear_color(
        &mut self,
        target: &mut ColorBuffer,
        rect: Option<ScissorRect>,
    ) -> Result<(), GraphicsError> {
        let color = target.clear_color();
        self.clear_color_with(target, color, rect)
    }

    pub fn clear_color_with(
        &mut self,
        target: &mut ColorBuffer,
        color: [f32; 4],
        rect: Option<ScissorRect>,
    ) -> Result<(), GraphicsError> {
        self.0.transition_resource(target, ResourceState::RENDER_TARGET, true)?;
        self.0.record(Command::ClearRenderTarget {
            rtv: target.rtv(),
            color,
            rect,
        })
    }

    fn clear_depth_stencil(
        &mut self,
        target: &mut DepthBuffer,
        flags: ClearFlags,
    ) -> Result<(), GraphicsError> {
        self.0.transition_resource(target, ResourceState::DEPTH_WRITE, true)?;
        self.0.record(Command::ClearDepthStencil {
            dsv: target.dsv(),
            flags,
            depth: target.clear_depth(),
            stencil: target.clear_stencil(),
        })
    }

    pub fn clear_depth(&mut self, target: &mut DepthBuffer) -> Result<(), GraphicsError> {
        self.clear_depth_stencil(target, ClearFlags::DEPTH)
    }

    pub fn clear_stencil(&mut self, target: &mut DepthBuffer) -> Result<(), GraphicsError> {
        self.clear_depth_stencil(target, ClearFlags::STENCIL)
    }

    pub fn clear_depth_and_stencil(&mut self, target: &mut DepthBuffer) -> Result<(), GraphicsError> {
        self.clear_depth_stencil(target, ClearFlags::DEPTH | ClearFlags::STENCIL)
    }

    /// Fill a buffer's unordered-access view with `value`.
    ///
    /// The clear reads the UAV through a shader-visible descriptor, so the
    /// view is uploaded into this context's heap first.
    pub fn clear_uav(&mut self, target: &mut GpuBuffer, value: u32) -> Result<(), GraphicsError> {
        self.0.transition_resource(target, ResourceState::UNORDERED_ACCESS, true)?;
        let cpu = target.uav();
        let gpu = self.0.upload_descriptor(DescriptorHeapType::CbvSrvUav, cpu)?;
        let Some(resource) = target.raw() else {
            return Err(GraphicsError::InvalidParameter(
                "resource has not been created".to_string(),
            ));
        };
        self.0.record(Command::ClearUnorderedAccess {
            resource,
            gpu,
            cpu,
            values: [value; 4],
        })
    }

    // --- Root arguments --------------------------------------------------------

    /// Set 32-bit root constants.
    pub fn set_constants(
        &mut self,
        root_index: u32,
        dest_offset: u32,
        values: &[u32],
    ) -> Result<(), GraphicsError> {
        self.0.record(Command::SetRootConstants {
            bind_point: BindPoint::Graphics,
            root_index,
            dest_offset,
            values: values.to_vec(),
        })
    }

    /// Bind a constant buffer by GPU address.
    pub fn set_constant_buffer(&mut self, root_index: u32, address: u64) -> Result<(), GraphicsError> {
        self.0.record(Command::SetRootConstantBufferView {
            bind_point: BindPoint::Graphics,
            root_index,
            address,
        })
    }

    /// Copy `data` into upload memory and bind it as a constant buffer.
    pub fn set_dynamic_constant_buffer_view(
        &mut self,
        root_index: u32,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let alloc = self.0.upload_bytes(data)?;
        self.set_constant_buffer(root_index, alloc.gpu_address())
    }

    pub fn set_dynamic_descriptor(
        &mut self,
        root_index: u32,
        offset: u32,
        handle: CpuDescriptorHandle,
    ) -> Result<(), GraphicsError> {
        self.set_dynamic_descriptors(root_index, offset, &[handle])
    }

    /// Stage views into a descriptor table; copied and bound at the next draw.
    pub fn set_dynamic_descriptors(
        &mut self,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        self.0.set_dynamic_descriptors_at(
            BindPoint::Graphics,
            DescriptorHeapType::CbvSrvUav,
            root_index,
            offset,
            handles,
        )
    }

    /// Stage samplers into a sampler table; copied and bound at the next draw.
    pub fn set_dynamic_samplers(
        &mut self,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        self.0.set_dynamic_descriptors_at(
            BindPoint::Graphics,
            DescriptorHeapType::Sampler,
            root_index,
            offset,
            handles,
        )
    }

    /// Bind a descriptor table living in a caller-managed heap.
    pub fn set_descriptor_table(
        &mut self,
        root_index: u32,
        base: GpuDescriptorHandle,
    ) -> Result<(), GraphicsError> {
        self.0.record(Command::SetRootDescriptorTable {
            bind_point: BindPoint::Graphics,
            root_index,
            base,
        })
    }

    // --- Input assembly ----------------------------------------------------------

    pub fn set_index_buffer(&mut self, view: IndexBufferView) -> Result<(), GraphicsError> {
        self.0.record(Command::SetIndexBuffer(view))
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, view: VertexBufferView) -> Result<(), GraphicsError> {
        self.set_vertex_buffers(slot, &[view])
    }

    pub fn set_vertex_buffers(
        &mut self,
        start_slot: u32,
        views: &[VertexBufferView],
    ) -> Result<(), GraphicsError> {
        self.0.record(Command::SetVertexBuffers {
            start_slot,
            views: views.to_vec(),
        })
    }

    /// Upload per-frame vertices and bind them to `slot`.
    pub fn set_dynamic_vb<T: bytemuck::Pod>(
        &mut self,
        slot: u32,
        vertices: &[T],
    ) -> Result<(), GraphicsError> {
        let alloc = self.0.upload(vertices)?;
        self.set_vertex_buffer(
            slot,
            VertexBufferView {
                address: alloc.gpu_address(),
                size: std::mem::size_of_val(vertices) as u32,
                stride: std::mem::size_of::<T>() as u32,
            },
        )
    }

    /// Upload per-frame 16-bit indices and bind them.
    pub fn set_dynamic_ib(&mut self, indices: &[u16]) -> Result<(), GraphicsError> {
        let alloc = self.0.upload(indices)?;
        self.set_index_buffer(IndexBufferView {
            address: alloc.gpu_address(),
            size: std::mem::size_of_val(indices) as u32,
            format: IndexFormat::Uint16,
        })
    }

    // --- Draws -------------------------------------------------------------------

    pub fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<(), GraphicsError> {
        self.draw_instanced(vertex_count, 1, start_vertex, 0)
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    ) -> Result<(), GraphicsError> {
        self.draw_indexed_instanced(index_count, 1, start_index, base_vertex, 0)
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.0.prepare_work(BindPoint::Graphics)?;
        self.0.record(Command::DrawInstanced {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        })
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> Result<(), GraphicsError> {
        self.0.prepare_work(BindPoint::Graphics)?;
        self.0.record(Command::DrawIndexedInstanced {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        })
    }
}

impl Deref for GraphicsContext {
    type Target = CommandContext;

    fn deref(&self) -> &CommandContext {
        &self.0
    }
}

impl DerefMut for GraphicsContext {
    fn deref_mut(&mut self) -> &mut CommandContext {
        &mut self.0
    }
}

impl std::fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("GraphicsContext").field(&self.0).finish()
    }
}

static_assertions::assert_impl_all!(GraphicsContext: Send);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::GraphicsConfig;
    use crate::device::GraphicsDevice;
    use crate::pipeline::{
        DescriptorRangeType, GraphicsPsoDesc, RootSignatureDesc, ShaderBytecode, ShaderVisibility,
    };
    use crate::resources::BufferKind;
    use crate::types::{TextureFormat, ViewDesc};

    fn device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let config = GraphicsConfig::default().with_debug_markers(false);
        let device = GraphicsDevice::with_backend(backend.clone(), config).unwrap();
        (backend, device)
    }

    fn textured_root_signature(device: &GraphicsDevice) -> RootSignature {
        device
            .create_root_signature(
                &RootSignatureDesc::new("Textured")
                    .with_constant_buffer(0, ShaderVisibility::All)
                    .with_descriptor_range(
                        DescriptorRangeType::ShaderResource,
                        0,
                        2,
                        ShaderVisibility::Pixel,
                    ),
            )
            .unwrap()
    }

    #[test]
    fn test_redundant_binds_skipped() {
        let (backend, device) = device();
        let rs = textured_root_signature(&device);
        let pso = device
            .create_graphics_pso(
                GraphicsPsoDesc::new("Opaque")
                    .with_root_signature(&rs)
                    .with_vertex_shader(ShaderBytecode::new(vec![1u8; 8]))
                    .with_pixel_shader(ShaderBytecode::new(vec![2u8; 8])),
            )
            .unwrap();

        let mut ctx = device.begin_graphics("").unwrap();
        ctx.set_root_signature(&rs).unwrap();
        ctx.set_pipeline_state(&pso).unwrap();
        ctx.set_root_signature(&rs).unwrap();
        ctx.set_pipeline_state(&pso).unwrap();
        assert_eq!(ctx.bound_pipeline_state(), Some(pso.raw()));
        ctx.finish(false).unwrap();

        let commands = backend.executed_lists().last().unwrap().commands.clone();
        assert_eq!(
            commands,
            vec![
                Command::SetRootSignature(BindPoint::Graphics, rs.raw()),
                Command::SetPipelineState(pso.raw()),
            ]
        );
    }

    #[test]
    fn test_draw_commits_staged_descriptors() {
        let (backend, device) = device();
        let rs = textured_root_signature(&device);
        let mut texels = GpuBuffer::new(BufferKind::Structured);
        texels.create(&device, "Texels", 16, 16, None).unwrap();

        let mut ctx = device.begin_graphics("").unwrap();
        ctx.set_root_signature(&rs).unwrap();
        ctx.set_dynamic_descriptor(1, 1, texels.srv()).unwrap();
        ctx.draw(3, 0).unwrap();
        ctx.finish(false).unwrap();

        let commands = backend.executed_lists().last().unwrap().commands.clone();
        assert!(matches!(commands[1], Command::SetDescriptorHeaps(ref heaps) if heaps.len() == 1));
        let Command::SetRootDescriptorTable {
            bind_point: BindPoint::Graphics,
            root_index: 1,
            base,
        } = commands[2]
        else {
            panic!("expected a descriptor table bind, got {:?}", commands[2]);
        };
        assert!(matches!(commands[3], Command::DrawInstanced { vertex_count: 3, .. }));

        let raw = texels.raw().unwrap();
        let slot = base.offset(1, crate::backend::dummy::DESCRIPTOR_INCREMENT);
        assert!(matches!(
            backend.view_at_gpu(slot),
            Some(ViewDesc::ShaderResource { resource, .. }) if resource == raw
        ));
    }

    #[test]
    fn test_clear_color_transitions_target() {
        let (backend, device) = device();
        let mut target = ColorBuffer::new([0.1, 0.2, 0.3, 1.0]);
        target
            .create(&device, "Scene color", 64, 64, 1, TextureFormat::Rgba16Float)
            .unwrap();

        let mut ctx = device.begin_graphics("").unwrap();
        ctx.clear_color(&mut target, None).unwrap();
        ctx.finish(false).unwrap();

        assert_eq!(target.usage_state(), ResourceState::RENDER_TARGET);
        let commands = backend.executed_lists().last().unwrap().commands.clone();
        assert!(matches!(commands[0], Command::ResourceBarrier(ref barriers) if barriers.len() == 1));
        assert!(matches!(
            commands[1],
            Command::ClearRenderTarget { rtv, color, rect: None }
                if rtv == target.rtv() && color == [0.1, 0.2, 0.3, 1.0]
        ));
    }

    #[test]
    fn test_dynamic_vertex_buffer_view() {
        let (backend, device) = device();
        let vertices: [[f32; 3]; 4] = [[0.0; 3], [1.0; 3], [2.0; 3], [3.0; 3]];
        let mut ctx = device.begin_graphics("").unwrap();
        ctx.set_dynamic_vb(0, &vertices).unwrap();
        ctx.set_dynamic_ib(&[0, 1, 2, 2, 3, 0]).unwrap();
        ctx.draw_indexed(6, 0, 0).unwrap();
        ctx.finish(false).unwrap();

        let commands = backend.executed_lists().last().unwrap().commands.clone();
        let Command::SetVertexBuffers { start_slot: 0, ref views } = commands[0] else {
            panic!("expected vertex buffers, got {:?}", commands[0]);
        };
        assert_eq!(views[0].size, 48);
        assert_eq!(views[0].stride, 12);
        assert!(matches!(
            commands[1],
            Command::SetIndexBuffer(IndexBufferView { size: 12, format: IndexFormat::Uint16, .. })
        ));
        assert_eq!(backend.stats().draws, 1);
    }
}
