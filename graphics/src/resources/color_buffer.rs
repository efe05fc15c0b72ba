//! Render targets.

use std::ops::{Deref, DerefMut};

use crate::backend::RawResource;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::{
    ClearValue, CpuDescriptorHandle, DescriptorHeapType, ResourceDesc, ResourceFlags,
    ResourceState, TextureFormat, ViewDesc,
};

use super::PixelBuffer;

/// A texture that can be rendered to, sampled and (when single-sampled)
/// written through an unordered-access view.
///
/// View descriptors are allocated the first time the buffer is created and
/// rewritten in place on every re-creation, so handles captured elsewhere stay
/// valid across a resize.
#[derive(Debug)]
pub struct ColorBuffer {
    base: PixelBuffer,
    clear_color: [f32; 4],
    sample_count: u32,
    mip_count: u16,
    rtv: CpuDescriptorHandle,
    srv: CpuDescriptorHandle,
    uav: CpuDescriptorHandle,
}

impl Default for ColorBuffer {
    fn default() -> Self {
        Self::new([0.0, 0.0, 0.0, 0.0])
    }
}

impl ColorBuffer {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self {
            base: PixelBuffer::new(),
            clear_color,
            sample_count: 1,
            mip_count: 1,
            rtv: CpuDescriptorHandle::NULL,
            srv: CpuDescriptorHandle::NULL,
            uav: CpuDescriptorHandle::NULL,
        }
    }

    /// Request multisampling for the next [`create`](Self::create).
    pub fn set_msaa_mode(&mut self, sample_count: u32) {
        self.sample_count = sample_count.max(1);
    }

    /// Allocate the texture and write its views.
    pub fn create(
        &mut self,
        device: &GraphicsDevice,
        label: &str,
        width: u32,
        height: u32,
        mip_count: u16,
        format: TextureFormat,
    ) -> Result<(), GraphicsError> {
        let mut flags = ResourceFlags::ALLOW_RENDER_TARGET;
        if self.sample_count == 1 {
            flags |= ResourceFlags::ALLOW_UNORDERED_ACCESS;
        }
        let desc = ResourceDesc::texture_2d(width, height, format)
            .with_label(label)
            .with_mip_levels(mip_count.max(1))
            .with_sample_count(self.sample_count)
            .with_flags(flags);
        self.base.create_texture(
            device,
            &desc,
            ResourceState::COMMON,
            Some(ClearValue::Color(self.clear_color)),
        )?;
        self.mip_count = desc.mip_levels;
        self.create_derived_views(device, format)
    }

    /// Wrap a swap-chain back buffer. Only a render target view is created.
    pub fn create_from_swap_chain(
        &mut self,
        device: &GraphicsDevice,
        label: &str,
        raw: RawResource,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<(), GraphicsError> {
        let desc = ResourceDesc::texture_2d(width, height, format).with_label(label);
        self.base.associate(device, raw, &desc, ResourceState::PRESENT);
        self.mip_count = 1;
        if self.rtv.is_null() {
            self.rtv = device.allocate_descriptor(DescriptorHeapType::Rtv, 1)?;
        }
        device.backend().create_view(
            &ViewDesc::RenderTarget {
                resource: raw,
                format,
            },
            self.rtv,
        );
        Ok(())
    }

    fn create_derived_views(
        &mut self,
        device: &GraphicsDevice,
        format: TextureFormat,
    ) -> Result<(), GraphicsError> {
        let resource = self.base.raw().ok_or_else(|| {
            GraphicsError::Internal("color buffer views written before creation".to_string())
        })?;
        if self.rtv.is_null() {
            self.rtv = device.allocate_descriptor(DescriptorHeapType::Rtv, 1)?;
        }
        if self.srv.is_null() {
            self.srv = device.allocate_descriptor(DescriptorHeapType::CbvSrvUav, 1)?;
        }
        if self.sample_count == 1 && self.uav.is_null() {
            self.uav = device.allocate_descriptor(DescriptorHeapType::CbvSrvUav, 1)?;
        }

        let backend = device.backend();
        backend.create_view(&ViewDesc::RenderTarget { resource, format }, self.rtv);
        backend.create_view(&ViewDesc::ShaderResource { resource, format }, self.srv);
        if self.sample_count == 1 {
            backend.create_view(&ViewDesc::UnorderedAccess { resource, format }, self.uav);
        }
        Ok(())
    }

    pub fn rtv(&self) -> CpuDescriptorHandle {
        self.rtv
    }

    pub fn srv(&self) -> CpuDescriptorHandle {
        self.srv
    }

    /// Null for multisampled buffers and swap-chain buffers.
    pub fn uav(&self) -> CpuDescriptorHandle {
        self.uav
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn mip_count(&self) -> u16 {
        self.mip_count
    }
}

impl Deref for ColorBuffer {
    type Target = PixelBuffer;

    fn deref(&self) -> &PixelBuffer {
        &self.base
    }
}

impl DerefMut for ColorBuffer {
    fn deref_mut(&mut self) -> &mut PixelBuffer {
        &mut self.base
    }
}

static_assertions::assert_impl_all!(ColorBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::GraphicsConfig;

    fn device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::with_backend(backend.clone(), GraphicsConfig::default())
            .unwrap();
        (backend, device)
    }

    #[test]
    fn test_create_writes_views() {
        let (backend, device) = device();
        let mut buffer = ColorBuffer::new([0.1, 0.2, 0.3, 1.0]);
        buffer
            .create(&device, "Scene color", 640, 480, 1, TextureFormat::Rgba16Float)
            .unwrap();

        assert_eq!(buffer.width(), 640);
        assert_eq!(buffer.height(), 480);
        assert_eq!(buffer.usage_state(), ResourceState::COMMON);
        let raw = buffer.raw().unwrap();
        assert!(matches!(
            backend.view_at(buffer.rtv()),
            Some(ViewDesc::RenderTarget { resource, .. }) if resource == raw
        ));
        assert!(matches!(
            backend.view_at(buffer.uav()),
            Some(ViewDesc::UnorderedAccess { resource, .. }) if resource == raw
        ));
    }

    #[test]
    fn test_recreate_reuses_descriptors() {
        let (backend, device) = device();
        let mut buffer = ColorBuffer::default();
        buffer
            .create(&device, "Target", 128, 128, 1, TextureFormat::Rgba8Unorm)
            .unwrap();
        let (rtv, srv, uav) = (buffer.rtv(), buffer.srv(), buffer.uav());
        let first = buffer.raw().unwrap();
        let version = buffer.version_id();

        buffer
            .create(&device, "Target", 256, 256, 1, TextureFormat::Rgba8Unorm)
            .unwrap();
        assert_eq!((buffer.rtv(), buffer.srv(), buffer.uav()), (rtv, srv, uav));
        assert!(!backend.is_resource_alive(first));
        assert_ne!(buffer.version_id(), version);
        let second = buffer.raw().unwrap();
        assert!(matches!(
            backend.view_at(rtv),
            Some(ViewDesc::RenderTarget { resource, .. }) if resource == second
        ));
    }

    #[test]
    fn test_msaa_has_no_uav() {
        let (_backend, device) = device();
        let mut buffer = ColorBuffer::default();
        buffer.set_msaa_mode(4);
        buffer
            .create(&device, "MSAA", 64, 64, 1, TextureFormat::Rgba8Unorm)
            .unwrap();
        assert!(buffer.uav().is_null());
        assert_eq!(buffer.sample_count(), 4);
    }
}
