//! Depth/stencil targets.

use std::ops::{Deref, DerefMut};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::{
    ClearValue, CpuDescriptorHandle, DescriptorHeapType, ResourceDesc, ResourceFlags,
    ResourceState, TextureFormat, ViewDesc,
};

use super::PixelBuffer;

/// A depth (and optionally stencil) texture with a writable view, a
/// read-only view and a sampled view of the depth plane.
#[derive(Debug)]
pub struct DepthBuffer {
    base: PixelBuffer,
    clear_depth: f32,
    clear_stencil: u8,
    dsv: CpuDescriptorHandle,
    dsv_read_only: CpuDescriptorHandle,
    depth_srv: CpuDescriptorHandle,
}

impl Default for DepthBuffer {
    fn default() -> Self {
        Self::new(0.0, 0)
    }
}

impl DepthBuffer {
    /// Reversed-Z setups clear depth to `0.0`.
    pub fn new(clear_depth: f32, clear_stencil: u8) -> Self {
        Self {
            base: PixelBuffer::new(),
            clear_depth,
            clear_stencil,
            dsv: CpuDescriptorHandle::NULL,
            dsv_read_only: CpuDescriptorHandle::NULL,
            depth_srv: CpuDescriptorHandle::NULL,
        }
    }

    pub fn create(
        &mut self,
        device: &GraphicsDevice,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<(), GraphicsError> {
        if !format.is_depth_stencil() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{format:?} is not a depth format"
            )));
        }
        let desc = ResourceDesc::texture_2d(width, height, format)
            .with_label(label)
            .with_flags(ResourceFlags::ALLOW_DEPTH_STENCIL);
        self.base.create_texture(
            device,
            &desc,
            ResourceState::DEPTH_WRITE,
            Some(ClearValue::DepthStencil {
                depth: self.clear_depth,
                stencil: self.clear_stencil,
            }),
        )?;

        let Some(resource) = self.base.raw() else {
            return Err(GraphicsError::Internal(
                "depth buffer views written before creation".to_string(),
            ));
        };
        if self.dsv.is_null() {
            self.dsv = device.allocate_descriptor(DescriptorHeapType::Dsv, 1)?;
            self.dsv_read_only = device.allocate_descriptor(DescriptorHeapType::Dsv, 1)?;
        }
        if self.depth_srv.is_null() {
            self.depth_srv = device.allocate_descriptor(DescriptorHeapType::CbvSrvUav, 1)?;
        }

        let backend = device.backend();
        backend.create_view(
            &ViewDesc::DepthStencil {
                resource,
                format,
                read_only: false,
            },
            self.dsv,
        );
        backend.create_view(
            &ViewDesc::DepthStencil {
                resource,
                format,
                read_only: true,
            },
            self.dsv_read_only,
        );
        backend.create_view(
            &ViewDesc::ShaderResource {
                resource,
                format: format.depth_srv_format(),
            },
            self.depth_srv,
        );
        Ok(())
    }

    pub fn dsv(&self) -> CpuDescriptorHandle {
        self.dsv
    }

    pub fn dsv_read_only(&self) -> CpuDescriptorHandle {
        self.dsv_read_only
    }

    pub fn depth_srv(&self) -> CpuDescriptorHandle {
        self.depth_srv
    }

    pub fn clear_depth(&self) -> f32 {
        self.clear_depth
    }

    pub fn clear_stencil(&self) -> u8 {
        self.clear_stencil
    }

    pub fn has_stencil(&self) -> bool {
        self.base.format().has_stencil()
    }
}

impl Deref for DepthBuffer {
    type Target = PixelBuffer;

    fn deref(&self) -> &PixelBuffer {
        &self.base
    }
}

impl DerefMut for DepthBuffer {
    fn deref_mut(&mut self) -> &mut PixelBuffer {
        &mut self.base
    }
}

static_assertions::assert_impl_all!(DepthBuffer: Send, Sync);
