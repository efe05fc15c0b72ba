//! Descriptor heap types, descriptor handles and view descriptions.

use super::{SamplerDesc, TextureFormat};
use crate::backend::RawResource;

/// Kind of descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// Constant buffer, shader resource and unordered access views.
    CbvSrvUav = 0,
    /// Samplers.
    Sampler = 1,
    /// Render target views. Never shader visible.
    Rtv = 2,
    /// Depth stencil views. Never shader visible.
    Dsv = 3,
}

impl DescriptorHeapType {
    /// All heap types, in index order.
    pub const ALL: [DescriptorHeapType; 4] = [
        DescriptorHeapType::CbvSrvUav,
        DescriptorHeapType::Sampler,
        DescriptorHeapType::Rtv,
        DescriptorHeapType::Dsv,
    ];

    /// Index for per-type arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether heaps of this type can be bound to the pipeline.
    pub const fn can_be_shader_visible(self) -> bool {
        matches!(
            self,
            DescriptorHeapType::CbvSrvUav | DescriptorHeapType::Sampler
        )
    }
}

/// CPU address of a descriptor. Zero is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CpuDescriptorHandle(pub usize);

impl CpuDescriptorHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Whether this handle points at a descriptor.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Handle `count` descriptors further, given the heap's increment size.
    pub fn offset(self, count: u32, increment: u32) -> Self {
        Self(self.0 + count as usize * increment as usize)
    }
}

/// GPU address of a descriptor in a shader-visible heap. Zero is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GpuDescriptorHandle(pub u64);

impl GpuDescriptorHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Whether this handle points at a descriptor.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Handle `count` descriptors further, given the heap's increment size.
    pub fn offset(self, count: u32, increment: u32) -> Self {
        Self(self.0 + count as u64 * increment as u64)
    }
}

/// What a descriptor written with `create_view` refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewDesc {
    /// Render target view of a texture.
    RenderTarget {
        resource: RawResource,
        format: TextureFormat,
    },
    /// Depth stencil view of a texture.
    DepthStencil {
        resource: RawResource,
        format: TextureFormat,
        read_only: bool,
    },
    /// Shader resource view of a texture or buffer.
    ShaderResource {
        resource: RawResource,
        format: TextureFormat,
    },
    /// Unordered access view of a texture or buffer.
    UnorderedAccess {
        resource: RawResource,
        format: TextureFormat,
    },
    /// Constant buffer view over a GPU address range.
    ConstantBuffer { address: u64, size: u32 },
    /// Sampler.
    Sampler(SamplerDesc),
}

impl ViewDesc {
    /// Heap type this view must be written into.
    pub fn heap_type(&self) -> DescriptorHeapType {
        match self {
            ViewDesc::RenderTarget { .. } => DescriptorHeapType::Rtv,
            ViewDesc::DepthStencil { .. } => DescriptorHeapType::Dsv,
            ViewDesc::Sampler(_) => DescriptorHeapType::Sampler,
            ViewDesc::ShaderResource { .. }
            | ViewDesc::UnorderedAccess { .. }
            | ViewDesc::ConstantBuffer { .. } => DescriptorHeapType::CbvSrvUav,
        }
    }

    /// Resource the view refers to, if any.
    pub fn resource(&self) -> Option<RawResource> {
        match self {
            ViewDesc::RenderTarget { resource, .. }
            | ViewDesc::DepthStencil { resource, .. }
            | ViewDesc::ShaderResource { resource, .. }
            | ViewDesc::UnorderedAccess { resource, .. } => Some(*resource),
            ViewDesc::ConstantBuffer { .. } | ViewDesc::Sampler(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_offset() {
        let cpu = CpuDescriptorHandle(0x1000);
        assert_eq!(cpu.offset(3, 32), CpuDescriptorHandle(0x1000 + 96));
        assert!(CpuDescriptorHandle::NULL.is_null());

        let gpu = GpuDescriptorHandle(0x2000);
        assert_eq!(gpu.offset(2, 32), GpuDescriptorHandle(0x2040));
    }

    #[test]
    fn test_view_heap_type() {
        let view = ViewDesc::ConstantBuffer {
            address: 0x100,
            size: 256,
        };
        assert_eq!(view.heap_type(), DescriptorHeapType::CbvSrvUav);
        assert_eq!(view.resource(), None);
        assert!(!DescriptorHeapType::Rtv.can_be_shader_visible());
    }
}
