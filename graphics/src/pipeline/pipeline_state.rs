//! Pipeline state objects.
//!
//! Shader bytecode is treated as an opaque blob. Descriptions are finalized
//! once through the device, which de-duplicates identical descriptions.

use std::sync::Arc;

use crate::backend::{RawPipelineState, RawRootSignature};
use crate::types::{CompareFunction, TextureFormat};

use super::RootSignature;

/// Opaque compiled shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderBytecode(Arc<[u8]>);

impl ShaderBytecode {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Input layout element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub semantic: String,
    pub semantic_index: u32,
    pub format: TextureFormat,
    pub input_slot: u32,
    pub byte_offset: u32,
}

impl InputElement {
    pub fn new(semantic: impl Into<String>, format: TextureFormat, byte_offset: u32) -> Self {
        Self {
            semantic: semantic.into(),
            semantic_index: 0,
            format,
            input_slot: 0,
            byte_offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    PremultipliedAlpha,
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterizerState {
    pub fill: FillMode,
    pub cull: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_clip: bool,
}

impl RasterizerState {
    pub fn two_sided() -> Self {
        Self {
            cull: CullMode::None,
            depth_clip: true,
            ..Default::default()
        }
    }

    pub fn shadow(depth_bias: i32) -> Self {
        Self {
            depth_bias,
            depth_clip: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunction,
    pub stencil: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self::read_write()
    }
}

impl DepthStencilState {
    pub fn disabled() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            compare: CompareFunction::Always,
            stencil: false,
        }
    }

    pub fn read_write() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareFunction::GreaterEqual,
            stencil: false,
        }
    }

    pub fn read_only() -> Self {
        Self {
            depth_write: false,
            ..Self::read_write()
        }
    }
}

/// Primitive class the pipeline rasterizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopologyType {
    Point,
    Line,
    #[default]
    Triangle,
}

/// Graphics pipeline description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GraphicsPsoDesc {
    pub label: String,
    pub root_signature: Option<RawRootSignature>,
    pub vertex_shader: ShaderBytecode,
    pub pixel_shader: ShaderBytecode,
    pub input_layout: Vec<InputElement>,
    pub blend: BlendMode,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub topology_type: PrimitiveTopologyType,
    pub render_target_formats: Vec<TextureFormat>,
    pub depth_format: TextureFormat,
    pub sample_count: u32,
}

impl GraphicsPsoDesc {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sample_count: 1,
            ..Default::default()
        }
    }

    pub fn with_root_signature(mut self, root_signature: &RootSignature) -> Self {
        self.root_signature = Some(root_signature.raw());
        self
    }

    pub fn with_vertex_shader(mut self, bytecode: ShaderBytecode) -> Self {
        self.vertex_shader = bytecode;
        self
    }

    pub fn with_pixel_shader(mut self, bytecode: ShaderBytecode) -> Self {
        self.pixel_shader = bytecode;
        self
    }

    pub fn with_input_layout(mut self, elements: Vec<InputElement>) -> Self {
        self.input_layout = elements;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: RasterizerState) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_depth_stencil(mut self, depth_stencil: DepthStencilState) -> Self {
        self.depth_stencil = depth_stencil;
        self
    }

    pub fn with_topology_type(mut self, topology_type: PrimitiveTopologyType) -> Self {
        self.topology_type = topology_type;
        self
    }

    pub fn with_render_target_formats(
        mut self,
        formats: &[TextureFormat],
        depth_format: TextureFormat,
    ) -> Self {
        self.render_target_formats = formats.to_vec();
        self.depth_format = depth_format;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }
}

/// Compute pipeline description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ComputePsoDesc {
    pub label: String,
    pub root_signature: Option<RawRootSignature>,
    pub compute_shader: ShaderBytecode,
}

impl ComputePsoDesc {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_root_signature(mut self, root_signature: &RootSignature) -> Self {
        self.root_signature = Some(root_signature.raw());
        self
    }

    pub fn with_compute_shader(mut self, bytecode: ShaderBytecode) -> Self {
        self.compute_shader = bytecode;
        self
    }
}

/// Either kind of pipeline description, as handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineStateDesc {
    Graphics(GraphicsPsoDesc),
    Compute(ComputePsoDesc),
}

impl PipelineStateDesc {
    /// Root signature the pipeline is built against.
    ///
    /// Descriptions reaching the backend always carry one; the device rejects
    /// descriptions without.
    pub fn root_signature(&self) -> RawRootSignature {
        let root_signature = match self {
            PipelineStateDesc::Graphics(desc) => desc.root_signature,
            PipelineStateDesc::Compute(desc) => desc.root_signature,
        };
        root_signature.unwrap_or(RawRootSignature::from_raw(0))
    }

    pub fn label(&self) -> &str {
        match self {
            PipelineStateDesc::Graphics(desc) => &desc.label,
            PipelineStateDesc::Compute(desc) => &desc.label,
        }
    }
}

/// A finalized graphics pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsPso {
    raw: RawPipelineState,
    desc: Arc<GraphicsPsoDesc>,
}

impl GraphicsPso {
    pub(crate) fn new(raw: RawPipelineState, desc: Arc<GraphicsPsoDesc>) -> Self {
        Self { raw, desc }
    }

    pub fn raw(&self) -> RawPipelineState {
        self.raw
    }

    pub fn desc(&self) -> &GraphicsPsoDesc {
        &self.desc
    }
}

/// A finalized compute pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePso {
    raw: RawPipelineState,
    desc: Arc<ComputePsoDesc>,
}

impl ComputePso {
    pub(crate) fn new(raw: RawPipelineState, desc: Arc<ComputePsoDesc>) -> Self {
        Self { raw, desc }
    }

    pub fn raw(&self) -> RawPipelineState {
        self.raw
    }

    pub fn desc(&self) -> &ComputePsoDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphics_desc_defaults() {
        let desc = GraphicsPsoDesc::new("Opaque");
        assert_eq!(desc.sample_count, 1);
        assert!(desc.root_signature.is_none());
        assert!(desc.vertex_shader.is_empty());
        assert_eq!(desc.topology_type, PrimitiveTopologyType::Triangle);
    }

    #[test]
    fn test_bytecode_identity_is_content() {
        let a = ShaderBytecode::new(vec![1u8, 2, 3]);
        let b = ShaderBytecode::new(vec![1u8, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(
            PipelineStateDesc::Compute(ComputePsoDesc::new("Blur").with_compute_shader(a)),
            PipelineStateDesc::Compute(ComputePsoDesc::new("Blur").with_compute_shader(b)),
        );
    }
}
