//! CPU-readable copies of GPU data.

use std::ops::{Deref, DerefMut};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::{HeapKind, ResourceDesc, ResourceState};

use super::GpuResource;

/// A readback-heap buffer that stays in `COPY_DEST`.
///
/// Fill it with [`CommandContext::readback_buffer`] and read it once that
/// context's fence has completed.
///
/// [`CommandContext::readback_buffer`]: crate::command::CommandContext::readback_buffer
#[derive(Debug, Default)]
pub struct ReadbackBuffer {
    resource: GpuResource,
    buffer_size: u64,
    label: String,
}

impl ReadbackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        device: &GraphicsDevice,
        label: &str,
        element_count: u32,
        element_size: u32,
    ) -> Result<(), GraphicsError> {
        self.resource.destroy();
        let buffer_size = element_count as u64 * element_size as u64;
        let desc = ResourceDesc::buffer(buffer_size).with_label(label);
        let backend = device.backend();
        let raw =
            backend.create_resource(&desc, HeapKind::Readback, ResourceState::COPY_DEST, None)?;
        self.resource.attach(backend.clone(), raw, ResourceState::COPY_DEST);
        self.buffer_size = buffer_size;
        self.label = label.to_string();
        Ok(())
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Copy the whole buffer out.
    pub fn read_bytes(&self) -> Result<Vec<u8>, GraphicsError> {
        let mut out = vec![0u8; self.buffer_size as usize];
        self.read_into(0, &mut out)?;
        Ok(out)
    }

    /// Copy `out.len()` bytes starting at `offset`.
    pub fn read_into(&self, offset: u64, out: &mut [u8]) -> Result<(), GraphicsError> {
        let (Some(raw), Some(backend)) = (self.resource.raw(), self.resource.backend()) else {
            return Err(GraphicsError::InvalidParameter(
                "readback buffer has not been created".to_string(),
            ));
        };
        backend.read_mapped(raw, offset, out)
    }

    /// Read the buffer as a vector of plain values.
    pub fn read_as<T: bytemuck::Pod>(&self) -> Result<Vec<T>, GraphicsError> {
        let bytes = self.read_bytes()?;
        Ok(bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}

impl Deref for ReadbackBuffer {
    type Target = GpuResource;

    fn deref(&self) -> &GpuResource {
        &self.resource
    }
}

impl DerefMut for ReadbackBuffer {
    fn deref_mut(&mut self) -> &mut GpuResource {
        &mut self.resource
    }
}

static_assertions::assert_impl_all!(ReadbackBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::GraphicsConfig;

    #[test]
    fn test_fresh_buffer_reads_zeroes() {
        let device = GraphicsDevice::with_backend(
            Arc::new(DummyBackend::new()),
            GraphicsConfig::default(),
        )
        .unwrap();
        let mut readback = ReadbackBuffer::new();
        readback.create(&device, "Readback", 4, 4).unwrap();
        assert_eq!(readback.usage_state(), ResourceState::COPY_DEST);
        assert_eq!(readback.read_as::<u32>().unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_read_before_create() {
        let readback = ReadbackBuffer::new();
        assert!(readback.read_bytes().is_err());
    }
}
