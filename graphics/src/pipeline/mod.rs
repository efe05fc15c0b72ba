//! Root signatures and pipeline state objects.
//!
//! Both are described by plain data, finalized once through the
//! [`GraphicsDevice`](crate::GraphicsDevice) and immutable afterwards.

mod pipeline_state;
mod root_signature;

pub use pipeline_state::{
    BlendMode, ComputePso, ComputePsoDesc, CullMode, DepthStencilState, FillMode, GraphicsPso,
    GraphicsPsoDesc, InputElement, PipelineStateDesc, PrimitiveTopologyType, RasterizerState,
    ShaderBytecode,
};
pub use root_signature::{
    DescriptorRange, DescriptorRangeType, MAX_DESCRIPTORS_PER_TABLE, MAX_ROOT_PARAMETERS,
    RootParameter, RootSignature, RootSignatureDesc, RootSignatureFlags, RootSignatureLayout,
    ShaderVisibility, StaticSampler,
};
