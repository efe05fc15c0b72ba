//! GPU-local buffers with shader views.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::command::CommandContext;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::{
    CpuDescriptorHandle, DescriptorHeapType, HeapKind, IndexBufferView, IndexFormat,
    ResourceDesc, ResourceFlags, ResourceState, TextureFormat, VertexBufferView, ViewDesc,
};

use super::GpuResource;

/// How shaders see the contents of a [`GpuBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferKind {
    /// Raw 32-bit addressed bytes.
    ByteAddress,
    /// Array of `element_size` structs.
    #[default]
    Structured,
    /// Elements of a texel format.
    Typed(TextureFormat),
}

impl BufferKind {
    fn view_format(self) -> TextureFormat {
        match self {
            BufferKind::ByteAddress => TextureFormat::R32Typeless,
            BufferKind::Structured => TextureFormat::Unknown,
            BufferKind::Typed(format) => format,
        }
    }
}

/// A buffer in GPU-local memory with an SRV and a UAV.
///
/// Initial contents are uploaded through a graphics context that is finished
/// before [`create`](Self::create) returns, leaving the buffer in
/// `GENERIC_READ`.
#[derive(Debug, Default)]
pub struct GpuBuffer {
    resource: GpuResource,
    kind: BufferKind,
    element_count: u32,
    element_size: u32,
    buffer_size: u64,
    label: String,
    srv: CpuDescriptorHandle,
    uav: CpuDescriptorHandle,
}

impl GpuBuffer {
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn create(
        &mut self,
        device: &Arc<GraphicsDevice>,
        label: &str,
        element_count: u32,
        element_size: u32,
        initial_data: Option<&[u8]>,
    ) -> Result<(), GraphicsError> {
        let buffer_size = element_count as u64 * element_size as u64;
        if let Some(data) = initial_data
            && data.len() as u64 > buffer_size
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} bytes of initial data for a {buffer_size} byte buffer",
                data.len()
            )));
        }

        self.resource.destroy();
        let desc = ResourceDesc::buffer(buffer_size)
            .with_label(label)
            .with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS);
        let backend = device.backend();
        let raw = backend.create_resource(&desc, HeapKind::Default, ResourceState::COMMON, None)?;
        self.resource.attach(backend.clone(), raw, ResourceState::COMMON);
        self.element_count = element_count;
        self.element_size = element_size;
        self.buffer_size = buffer_size;
        self.label = label.to_string();

        if let Some(data) = initial_data
            && !data.is_empty()
        {
            CommandContext::initialize_buffer(device, &mut self.resource, data, 0)?;
        }
        self.create_derived_views(device)
    }

    fn create_derived_views(&mut self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        let Some(resource) = self.resource.raw() else {
            return Err(GraphicsError::Internal(
                "buffer views written before creation".to_string(),
            ));
        };
        if self.srv.is_null() {
            self.srv = device.allocate_descriptor(DescriptorHeapType::CbvSrvUav, 1)?;
        }
        if self.uav.is_null() {
            self.uav = device.allocate_descriptor(DescriptorHeapType::CbvSrvUav, 1)?;
        }
        let format = self.kind.view_format();
        let backend = device.backend();
        backend.create_view(&ViewDesc::ShaderResource { resource, format }, self.srv);
        backend.create_view(&ViewDesc::UnorderedAccess { resource, format }, self.uav);
        Ok(())
    }

    /// Vertex buffer binding over `size` bytes starting at `offset`.
    pub fn vertex_buffer_view(&self, offset: u64, size: u32, stride: u32) -> VertexBufferView {
        VertexBufferView {
            address: self.resource.gpu_address() + offset,
            size,
            stride,
        }
    }

    /// Vertex buffer binding over the whole buffer, one element per vertex.
    pub fn full_vertex_buffer_view(&self) -> VertexBufferView {
        self.vertex_buffer_view(0, self.buffer_size as u32, self.element_size)
    }

    pub fn index_buffer_view(&self, offset: u64, size: u32, format: IndexFormat) -> IndexBufferView {
        IndexBufferView {
            address: self.resource.gpu_address() + offset,
            size,
            format,
        }
    }

    /// Index buffer binding over the whole buffer; 4-byte elements are
    /// 32-bit indices.
    pub fn full_index_buffer_view(&self) -> IndexBufferView {
        let format = if self.element_size == 4 {
            IndexFormat::Uint32
        } else {
            IndexFormat::Uint16
        };
        self.index_buffer_view(0, self.buffer_size as u32, format)
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn srv(&self) -> CpuDescriptorHandle {
        self.srv
    }

    pub fn uav(&self) -> CpuDescriptorHandle {
        self.uav
    }
}

impl Deref for GpuBuffer {
    type Target = GpuResource;

    fn deref(&self) -> &GpuResource {
        &self.resource
    }
}

impl DerefMut for GpuBuffer {
    fn deref_mut(&mut self) -> &mut GpuResource {
        &mut self.resource
    }
}

static_assertions::assert_impl_all!(GpuBuffer: Send, Sync);
