//! Root signatures.
//!
//! A [`RootSignatureDesc`] is assembled with builder calls, then finalized
//! once through [`GraphicsDevice::create_root_signature`], which
//! de-duplicates identical descriptions. The resulting [`RootSignature`] is
//! immutable and cheap to clone; the device owns the backend object.
//!
//! [`GraphicsDevice::create_root_signature`]: crate::GraphicsDevice::create_root_signature

use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::RawRootSignature;
use crate::error::GraphicsError;
use crate::types::SamplerDesc;

/// Maximum number of root parameters in one signature.
pub const MAX_ROOT_PARAMETERS: usize = 16;

/// Maximum number of descriptors in one descriptor table.
pub const MAX_DESCRIPTORS_PER_TABLE: u32 = 64;

/// Shader stages a root parameter is visible to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderVisibility {
    #[default]
    All,
    Vertex,
    Pixel,
}

/// Kind of descriptors in a table range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorRangeType {
    ShaderResource,
    UnorderedAccess,
    ConstantBuffer,
    Sampler,
}

/// A run of consecutive registers in a descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub range_type: DescriptorRangeType,
    pub base_register: u32,
    pub count: u32,
    pub space: u32,
}

impl DescriptorRange {
    pub fn new(range_type: DescriptorRangeType, base_register: u32, count: u32) -> Self {
        Self {
            range_type,
            base_register,
            count,
            space: 0,
        }
    }

    pub fn with_space(mut self, space: u32) -> Self {
        self.space = space;
        self
    }
}

/// One slot of a root signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootParameter {
    /// 32-bit values written directly into the root.
    Constants {
        register: u32,
        space: u32,
        count: u32,
        visibility: ShaderVisibility,
    },
    /// Root constant buffer view, bound by GPU address.
    ConstantBuffer {
        register: u32,
        space: u32,
        visibility: ShaderVisibility,
    },
    /// Root shader resource view, bound by GPU address.
    ShaderResource {
        register: u32,
        space: u32,
        visibility: ShaderVisibility,
    },
    /// Root unordered access view, bound by GPU address.
    UnorderedAccess {
        register: u32,
        space: u32,
        visibility: ShaderVisibility,
    },
    /// Table of descriptors in a shader-visible heap.
    DescriptorTable {
        ranges: Vec<DescriptorRange>,
        visibility: ShaderVisibility,
    },
}

impl RootParameter {
    /// Total descriptor count of a table parameter, zero otherwise.
    pub fn table_size(&self) -> u32 {
        match self {
            RootParameter::DescriptorTable { ranges, .. } => ranges.iter().map(|r| r.count).sum(),
            _ => 0,
        }
    }

    fn is_sampler_table(&self) -> bool {
        matches!(
            self,
            RootParameter::DescriptorTable { ranges, .. }
                if ranges.first().is_some_and(|r| r.range_type == DescriptorRangeType::Sampler)
        )
    }
}

/// Sampler baked into the root signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticSampler {
    pub register: u32,
    pub space: u32,
    pub desc: SamplerDesc,
    pub visibility: ShaderVisibility,
}

bitflags! {
    /// Root signature creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RootSignatureFlags: u32 {
        const ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT = 1 << 0;
        const DENY_VERTEX_SHADER_ROOT_ACCESS = 1 << 1;
        const DENY_PIXEL_SHADER_ROOT_ACCESS = 1 << 2;
    }
}

/// Description of a root signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RootSignatureDesc {
    pub label: String,
    pub parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSampler>,
    pub flags: RootSignatureFlags,
}

impl RootSignatureDesc {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: RootSignatureFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_constants(mut self, register: u32, count: u32, visibility: ShaderVisibility) -> Self {
        self.parameters.push(RootParameter::Constants {
            register,
            space: 0,
            count,
            visibility,
        });
        self
    }

    pub fn with_constant_buffer(mut self, register: u32, visibility: ShaderVisibility) -> Self {
        self.parameters.push(RootParameter::ConstantBuffer {
            register,
            space: 0,
            visibility,
        });
        self
    }

    pub fn with_shader_resource(mut self, register: u32, visibility: ShaderVisibility) -> Self {
        self.parameters.push(RootParameter::ShaderResource {
            register,
            space: 0,
            visibility,
        });
        self
    }

    pub fn with_unordered_access(mut self, register: u32, visibility: ShaderVisibility) -> Self {
        self.parameters.push(RootParameter::UnorderedAccess {
            register,
            space: 0,
            visibility,
        });
        self
    }

    /// Append a table made of a single range.
    pub fn with_descriptor_range(
        self,
        range_type: DescriptorRangeType,
        base_register: u32,
        count: u32,
        visibility: ShaderVisibility,
    ) -> Self {
        self.with_descriptor_table(
            vec![DescriptorRange::new(range_type, base_register, count)],
            visibility,
        )
    }

    pub fn with_descriptor_table(
        mut self,
        ranges: Vec<DescriptorRange>,
        visibility: ShaderVisibility,
    ) -> Self {
        self.parameters
            .push(RootParameter::DescriptorTable { ranges, visibility });
        self
    }

    pub fn with_static_sampler(
        mut self,
        register: u32,
        desc: SamplerDesc,
        visibility: ShaderVisibility,
    ) -> Self {
        self.static_samplers.push(StaticSampler {
            register,
            space: 0,
            desc,
            visibility,
        });
        self
    }

    /// Check the description and compute its descriptor table layout.
    pub fn layout(&self) -> Result<RootSignatureLayout, GraphicsError> {
        if self.parameters.len() > MAX_ROOT_PARAMETERS {
            return Err(GraphicsError::InvalidParameter(format!(
                "root signature {:?} has {} parameters (max {})",
                self.label,
                self.parameters.len(),
                MAX_ROOT_PARAMETERS
            )));
        }

        let mut layout = RootSignatureLayout::default();
        for (index, parameter) in self.parameters.iter().enumerate() {
            let RootParameter::DescriptorTable { ranges, .. } = parameter else {
                continue;
            };
            if ranges.is_empty() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "root parameter {index} of {:?} is an empty descriptor table",
                    self.label
                )));
            }
            let sampler = parameter.is_sampler_table();
            let mixed = ranges
                .iter()
                .any(|r| (r.range_type == DescriptorRangeType::Sampler) != sampler);
            if mixed {
                return Err(GraphicsError::InvalidParameter(format!(
                    "root parameter {index} of {:?} mixes samplers with views",
                    self.label
                )));
            }
            let size = parameter.table_size();
            if size == 0 || size > MAX_DESCRIPTORS_PER_TABLE {
                return Err(GraphicsError::InvalidParameter(format!(
                    "descriptor table {index} of {:?} holds {size} descriptors",
                    self.label
                )));
            }
            if sampler {
                layout.sampler_table_bitmap |= 1 << index;
            } else {
                layout.descriptor_table_bitmap |= 1 << index;
            }
            layout.descriptor_table_size[index] = size;
        }
        Ok(layout)
    }
}

/// Which root parameters are descriptor tables, and how large they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RootSignatureLayout {
    /// Bit `i` set when parameter `i` is a view (CBV/SRV/UAV) table.
    pub descriptor_table_bitmap: u32,
    /// Bit `i` set when parameter `i` is a sampler table.
    pub sampler_table_bitmap: u32,
    pub descriptor_table_size: [u32; MAX_ROOT_PARAMETERS],
}

impl RootSignatureLayout {
    /// Bitmap of tables living in heaps of the given kind.
    pub fn table_bitmap(&self, samplers: bool) -> u32 {
        if samplers {
            self.sampler_table_bitmap
        } else {
            self.descriptor_table_bitmap
        }
    }
}

#[derive(Debug)]
struct RootSignatureInner {
    raw: RawRootSignature,
    desc: RootSignatureDesc,
    layout: RootSignatureLayout,
}

/// A finalized, immutable root signature.
#[derive(Debug, Clone)]
pub struct RootSignature {
    inner: Arc<RootSignatureInner>,
}

impl PartialEq for RootSignature {
    fn eq(&self, other: &Self) -> bool {
        self.inner.raw == other.inner.raw
    }
}

impl Eq for RootSignature {}

impl RootSignature {
    pub(crate) fn new(raw: RawRootSignature, desc: RootSignatureDesc, layout: RootSignatureLayout) -> Self {
        Self {
            inner: Arc::new(RootSignatureInner { raw, desc, layout }),
        }
    }

    pub fn raw(&self) -> RawRootSignature {
        self.inner.raw
    }

    pub fn desc(&self) -> &RootSignatureDesc {
        &self.inner.desc
    }

    pub fn layout(&self) -> &RootSignatureLayout {
        &self.inner.layout
    }

    pub fn parameter_count(&self) -> usize {
        self.inner.desc.parameters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_classifies_tables() {
        let desc = RootSignatureDesc::new("test")
            .with_constant_buffer(0, ShaderVisibility::All)
            .with_descriptor_range(DescriptorRangeType::ShaderResource, 0, 4, ShaderVisibility::Pixel)
            .with_constants(1, 4, ShaderVisibility::Vertex)
            .with_descriptor_range(DescriptorRangeType::Sampler, 0, 2, ShaderVisibility::Pixel);

        let layout = desc.layout().unwrap();
        assert_eq!(layout.descriptor_table_bitmap, 0b0010);
        assert_eq!(layout.sampler_table_bitmap, 0b1000);
        assert_eq!(layout.descriptor_table_size[1], 4);
        assert_eq!(layout.descriptor_table_size[3], 2);
        assert_eq!(layout.descriptor_table_size[0], 0);
    }

    #[test]
    fn test_multi_range_table_size() {
        let desc = RootSignatureDesc::new("ranges").with_descriptor_table(
            vec![
                DescriptorRange::new(DescriptorRangeType::ShaderResource, 0, 3),
                DescriptorRange::new(DescriptorRangeType::UnorderedAccess, 0, 2),
            ],
            ShaderVisibility::All,
        );
        assert_eq!(desc.layout().unwrap().descriptor_table_size[0], 5);
    }

    #[test]
    fn test_mixed_table_rejected() {
        let desc = RootSignatureDesc::new("mixed").with_descriptor_table(
            vec![
                DescriptorRange::new(DescriptorRangeType::ShaderResource, 0, 1),
                DescriptorRange::new(DescriptorRangeType::Sampler, 0, 1),
            ],
            ShaderVisibility::All,
        );
        assert!(desc.layout().is_err());
    }

    #[test]
    fn test_too_many_parameters_rejected() {
        let desc = (0..17).fold(RootSignatureDesc::new("big"), |desc, i| {
            desc.with_constant_buffer(i, ShaderVisibility::All)
        });
        assert!(matches!(
            desc.layout(),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }
}
