//! Base GPU resource with usage-state tracking.

use std::sync::Arc;

use crate::backend::{GpuBackend, RawResource};
use crate::types::ResourceState;

/// A GPU allocation and the state it is in on the GPU timeline.
///
/// Every typed buffer wraps exactly one `GpuResource` and dereferences to it,
/// so command contexts can transition any of them. The usage state is only
/// changed through a context holding `&mut` access.
///
/// Destroying the resource (explicitly or on drop) releases the backend
/// object right away; the GPU must no longer be using it.
pub struct GpuResource {
    backend: Option<Arc<dyn GpuBackend>>,
    raw: Option<RawResource>,
    usage_state: ResourceState,
    transitioning_state: Option<ResourceState>,
    gpu_address: u64,
    version_id: u32,
}

impl Default for GpuResource {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuResource {
    /// Create an empty wrapper with no backing allocation.
    pub fn new() -> Self {
        Self {
            backend: None,
            raw: None,
            usage_state: ResourceState::COMMON,
            transitioning_state: None,
            gpu_address: 0,
            version_id: 0,
        }
    }

    /// Take ownership of `raw`, releasing any previous allocation.
    pub(crate) fn attach(
        &mut self,
        backend: Arc<dyn GpuBackend>,
        raw: RawResource,
        state: ResourceState,
    ) {
        self.destroy();
        self.gpu_address = backend.gpu_virtual_address(raw);
        self.backend = Some(backend);
        self.raw = Some(raw);
        self.usage_state = state;
    }

    /// Release the backend allocation. Bumps the version id.
    pub fn destroy(&mut self) {
        if let (Some(raw), Some(backend)) = (self.raw.take(), self.backend.as_ref()) {
            backend.destroy_resource(raw);
        }
        self.gpu_address = 0;
        self.usage_state = ResourceState::COMMON;
        self.transitioning_state = None;
        self.version_id = self.version_id.wrapping_add(1);
    }

    /// Backend handle, `None` until created.
    pub fn raw(&self) -> Option<RawResource> {
        self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.raw.is_some()
    }

    /// State the resource is in once all recorded barriers have executed.
    pub fn usage_state(&self) -> ResourceState {
        self.usage_state
    }

    /// Target of a split barrier whose begin half has been recorded.
    pub fn transitioning_state(&self) -> Option<ResourceState> {
        self.transitioning_state
    }

    /// GPU virtual address; zero for textures and destroyed resources.
    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    /// Incremented every time the allocation is released.
    pub fn version_id(&self) -> u32 {
        self.version_id
    }

    pub(crate) fn backend(&self) -> Option<&Arc<dyn GpuBackend>> {
        self.backend.as_ref()
    }

    pub(crate) fn set_usage_state(&mut self, state: ResourceState) {
        self.usage_state = state;
    }

    pub(crate) fn set_transitioning_state(&mut self, state: Option<ResourceState>) {
        self.transitioning_state = state;
    }
}

impl Drop for GpuResource {
    fn drop(&mut self) {
        if self.raw.is_some() {
            self.destroy();
        }
    }
}

impl std::fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuResource")
            .field("raw", &self.raw)
            .field("usage_state", &self.usage_state)
            .field("transitioning_state", &self.transitioning_state)
            .field("version_id", &self.version_id)
            .finish()
    }
}

static_assertions::assert_impl_all!(GpuResource: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{HeapKind, ResourceDesc};

    #[test]
    fn test_empty_resource() {
        let resource = GpuResource::new();
        assert!(!resource.is_valid());
        assert_eq!(resource.usage_state(), ResourceState::COMMON);
        assert_eq!(resource.gpu_address(), 0);
    }

    #[test]
    fn test_destroy_releases_and_bumps_version() {
        let backend = Arc::new(DummyBackend::new());
        let raw = backend
            .create_resource(
                &ResourceDesc::buffer(256),
                HeapKind::Default,
                ResourceState::COPY_DEST,
                None,
            )
            .unwrap();
        let mut resource = GpuResource::new();
        resource.attach(backend.clone(), raw, ResourceState::COPY_DEST);
        let version = resource.version_id();
        assert_ne!(resource.gpu_address(), 0);
        assert_eq!(resource.usage_state(), ResourceState::COPY_DEST);

        resource.destroy();
        assert!(!resource.is_valid());
        assert!(!backend.is_resource_alive(raw));
        assert_eq!(resource.version_id(), version + 1);
    }

    #[test]
    fn test_drop_releases() {
        let backend = Arc::new(DummyBackend::new());
        let raw = backend
            .create_resource(
                &ResourceDesc::buffer(64),
                HeapKind::Default,
                ResourceState::COMMON,
                None,
            )
            .unwrap();
        let mut resource = GpuResource::new();
        resource.attach(backend.clone(), raw, ResourceState::COMMON);
        drop(resource);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_debug() {
        let debug = format!("{:?}", GpuResource::new());
        assert!(debug.contains("GpuResource"));
    }
}
