//! Resource descriptors and heap kinds.

use bitflags::bitflags;

use super::TextureFormat;

/// Memory heap a resource is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeapKind {
    /// GPU-local memory, not CPU accessible.
    #[default]
    Default,
    /// CPU-writable memory the GPU reads from.
    Upload,
    /// GPU-writable memory the CPU reads back.
    Readback,
}

impl HeapKind {
    /// Whether the CPU may map the resource for writing.
    pub fn is_cpu_writable(self) -> bool {
        self == HeapKind::Upload
    }

    /// Whether the CPU may map the resource for reading.
    pub fn is_cpu_readable(self) -> bool {
        matches!(self, HeapKind::Upload | HeapKind::Readback)
    }
}

/// Dimensionality of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceDimension {
    #[default]
    Buffer,
    Texture2D,
}

bitflags! {
    /// Capabilities a resource is created with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        const ALLOW_RENDER_TARGET = 1 << 0;
        const ALLOW_DEPTH_STENCIL = 1 << 1;
        const ALLOW_UNORDERED_ACCESS = 1 << 2;
        const DENY_SHADER_RESOURCE = 1 << 3;
    }
}

/// Description of a buffer or texture to create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceDesc {
    /// Debug label.
    pub label: Option<String>,
    pub dimension: ResourceDimension,
    /// Width in texels, or size in bytes for buffers.
    pub width: u64,
    pub height: u32,
    /// Array size for 2D textures.
    pub array_size: u16,
    pub mip_levels: u16,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    /// Describe a buffer of `size` bytes.
    pub fn buffer(size: u64) -> Self {
        Self {
            label: None,
            dimension: ResourceDimension::Buffer,
            width: size,
            height: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: 1,
            format: TextureFormat::Unknown,
            flags: ResourceFlags::empty(),
        }
    }

    /// Describe a 2D texture.
    pub fn texture_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: None,
            dimension: ResourceDimension::Texture2D,
            width: width as u64,
            height,
            array_size: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
            flags: ResourceFlags::empty(),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the creation flags.
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the array size.
    pub fn with_array_size(mut self, size: u16) -> Self {
        self.array_size = size;
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u16) -> Self {
        self.mip_levels = count;
        self
    }

    /// Set the sample count.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Whether this describes a buffer.
    pub fn is_buffer(&self) -> bool {
        self.dimension == ResourceDimension::Buffer
    }

    /// Approximate byte size of the resource's top mip across all slices.
    pub fn byte_size(&self) -> u64 {
        match self.dimension {
            ResourceDimension::Buffer => self.width,
            ResourceDimension::Texture2D => {
                self.width
                    * self.height as u64
                    * self.array_size as u64
                    * self.sample_count as u64
                    * self.format.block_size() as u64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_desc() {
        let desc = ResourceDesc::buffer(4096).with_label("vb");
        assert!(desc.is_buffer());
        assert_eq!(desc.byte_size(), 4096);
        assert_eq!(desc.label.as_deref(), Some("vb"));
    }

    #[test]
    fn test_texture_byte_size() {
        let desc = ResourceDesc::texture_2d(64, 32, TextureFormat::Rgba8Unorm).with_array_size(2);
        assert_eq!(desc.byte_size(), 64 * 32 * 2 * 4);
    }

    #[test]
    fn test_heap_access() {
        assert!(HeapKind::Upload.is_cpu_writable());
        assert!(!HeapKind::Readback.is_cpu_writable());
        assert!(HeapKind::Readback.is_cpu_readable());
        assert!(!HeapKind::Default.is_cpu_readable());
    }
}
