//! Resource usage states.

use bitflags::bitflags;

bitflags! {
    /// Access/visibility state of a GPU resource.
    ///
    /// Read-only states may be combined (for example
    /// `PIXEL_SHADER_RESOURCE | NON_PIXEL_SHADER_RESOURCE`). Write states
    /// (`RENDER_TARGET`, `UNORDERED_ACCESS`, `DEPTH_WRITE`, `COPY_DEST`) are
    /// exclusive. `COMMON` is the empty set and doubles as the present state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        /// Bound as a vertex buffer or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        /// Bound as an index buffer.
        const INDEX_BUFFER = 1 << 1;
        /// Written as a render target.
        const RENDER_TARGET = 1 << 2;
        /// Read or written through an unordered-access view.
        const UNORDERED_ACCESS = 1 << 3;
        /// Written as a depth/stencil target.
        const DEPTH_WRITE = 1 << 4;
        /// Read-only depth/stencil.
        const DEPTH_READ = 1 << 5;
        /// Read by non-pixel shader stages.
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        /// Read by the pixel shader.
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        /// Read as indirect draw/dispatch arguments.
        const INDIRECT_ARGUMENT = 1 << 9;
        /// Destination of a copy.
        const COPY_DEST = 1 << 10;
        /// Source of a copy.
        const COPY_SOURCE = 1 << 11;
        /// Every read state an upload heap resource lives in.
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
    }
}

impl ResourceState {
    /// Shared state with no particular access. Resources decay to it.
    pub const COMMON: Self = Self::empty();
    /// State a swap-chain buffer must be in to be presented.
    pub const PRESENT: Self = Self::empty();

    /// Whether the state includes a write access.
    pub fn is_write(self) -> bool {
        self.intersects(
            Self::RENDER_TARGET | Self::UNORDERED_ACCESS | Self::DEPTH_WRITE | Self::COPY_DEST,
        )
    }

    /// Whether a copy queue can transition into or out of this state.
    pub fn is_copy_queue_compatible(self) -> bool {
        (Self::COPY_DEST | Self::COPY_SOURCE).contains(self)
    }

    /// Whether a compute queue can transition into or out of this state.
    pub fn is_compute_queue_compatible(self) -> bool {
        (Self::VERTEX_AND_CONSTANT_BUFFER
            | Self::UNORDERED_ACCESS
            | Self::NON_PIXEL_SHADER_RESOURCE
            | Self::INDIRECT_ARGUMENT
            | Self::COPY_DEST
            | Self::COPY_SOURCE)
            .contains(self)
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::COMMON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_and_present_alias() {
        assert_eq!(ResourceState::COMMON, ResourceState::PRESENT);
        assert!(ResourceState::COMMON.is_empty());
    }

    #[test]
    fn test_generic_read_is_read_only() {
        assert!(!ResourceState::GENERIC_READ.is_write());
        assert!(ResourceState::GENERIC_READ.contains(ResourceState::COPY_SOURCE));
        assert!(ResourceState::UNORDERED_ACCESS.is_write());
    }

    #[test]
    fn test_queue_compatibility() {
        assert!(ResourceState::COPY_DEST.is_copy_queue_compatible());
        assert!(!ResourceState::RENDER_TARGET.is_copy_queue_compatible());
        assert!(ResourceState::UNORDERED_ACCESS.is_compute_queue_compatible());
        assert!(!ResourceState::PIXEL_SHADER_RESOURCE.is_compute_queue_compatible());
    }
}
