//! Shared base of 2D texture resources.

use std::ops::{Deref, DerefMut};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::{ClearValue, HeapKind, ResourceDesc, ResourceState, TextureFormat};

use super::GpuResource;

/// A 2D texture (or texture array) with its dimensions and format.
///
/// Color and depth buffers wrap one and add their views.
#[derive(Debug, Default)]
pub struct PixelBuffer {
    resource: GpuResource,
    width: u32,
    height: u32,
    array_size: u16,
    format: TextureFormat,
    label: String,
}

impl PixelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn array_size(&self) -> u16 {
        self.array_size
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn resource(&self) -> &GpuResource {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut GpuResource {
        &mut self.resource
    }

    /// Allocate the texture on the default heap, releasing any previous one.
    pub(crate) fn create_texture(
        &mut self,
        device: &GraphicsDevice,
        desc: &ResourceDesc,
        initial_state: ResourceState,
        clear_value: Option<ClearValue>,
    ) -> Result<(), GraphicsError> {
        self.resource.destroy();
        let backend = device.backend();
        let raw = backend.create_resource(desc, HeapKind::Default, initial_state, clear_value)?;
        self.resource.attach(backend.clone(), raw, initial_state);
        self.width = desc.width as u32;
        self.height = desc.height;
        self.array_size = desc.array_size;
        self.format = desc.format;
        self.label = desc.label.clone().unwrap_or_default();
        Ok(())
    }

    /// Adopt a texture created elsewhere, such as a swap-chain back buffer.
    pub(crate) fn associate(
        &mut self,
        device: &GraphicsDevice,
        raw: crate::backend::RawResource,
        desc: &ResourceDesc,
        state: ResourceState,
    ) {
        self.resource.attach(device.backend().clone(), raw, state);
        self.width = desc.width as u32;
        self.height = desc.height;
        self.array_size = desc.array_size;
        self.format = desc.format;
        self.label = desc.label.clone().unwrap_or_default();
    }
}

impl Deref for PixelBuffer {
    type Target = GpuResource;

    fn deref(&self) -> &GpuResource {
        &self.resource
    }
}

impl DerefMut for PixelBuffer {
    fn deref_mut(&mut self) -> &mut GpuResource {
        &mut self.resource
    }
}

static_assertions::assert_impl_all!(PixelBuffer: Send, Sync);
