//! Sampler state.

use std::hash::{Hash, Hasher};

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
    Anisotropic,
}

/// Texture coordinate addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Clamp,
    Wrap,
    Mirror,
    Border,
}

/// Comparison function for comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Border color for [`AddressMode::Border`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Full sampler description, used both for sampler descriptors and for the
/// static samplers of a root signature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub compare: Option<CompareFunction>,
    pub border_color: BorderColor,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: FilterMode::Linear,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            mip_lod_bias: 0.0,
            max_anisotropy: 16,
            compare: None,
            border_color: BorderColor::TransparentBlack,
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl SamplerDesc {
    /// Linear filtering with wrap addressing.
    pub fn linear_wrap() -> Self {
        Self::default()
    }

    /// Linear filtering with clamp addressing.
    pub fn linear_clamp() -> Self {
        Self::default().with_address_mode(AddressMode::Clamp)
    }

    /// Point filtering with clamp addressing.
    pub fn point_clamp() -> Self {
        Self {
            filter: FilterMode::Nearest,
            ..Self::linear_clamp()
        }
    }

    /// Comparison sampler for shadow maps.
    pub fn shadow() -> Self {
        Self {
            compare: Some(CompareFunction::GreaterEqual),
            ..Self::linear_clamp()
        }
    }

    /// Set address mode for all coordinates.
    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_u = mode;
        self.address_v = mode;
        self.address_w = mode;
        self
    }
}

// f32 fields are compared and hashed bitwise so descriptors can key caches.
impl Eq for SamplerDesc {}

impl Hash for SamplerDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filter.hash(state);
        self.address_u.hash(state);
        self.address_v.hash(state);
        self.address_w.hash(state);
        self.mip_lod_bias.to_bits().hash(state);
        self.max_anisotropy.hash(state);
        self.compare.hash(state);
        self.border_color.hash(state);
        self.min_lod.to_bits().hash(state);
        self.max_lod.to_bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(SamplerDesc::point_clamp().filter, FilterMode::Nearest);
        assert_eq!(SamplerDesc::linear_clamp().address_w, AddressMode::Clamp);
        assert!(SamplerDesc::shadow().compare.is_some());
        assert_ne!(SamplerDesc::linear_wrap(), SamplerDesc::linear_clamp());
    }
}
