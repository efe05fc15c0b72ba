//! Runtime configuration for the graphics device.
//!
//! Configuration can be built in code with the `with_*` setters or loaded
//! from a TOML file:
//!
//! ```toml
//! frames_in_flight = 2
//! swap_chain_buffer_count = 3
//! gpu_page_size = 65536
//! cpu_page_size = 2097152
//! ```
//!
//! Missing keys fall back to [`GraphicsConfig::default`].

use std::path::Path;

use serde::Deserialize;

use crate::error::GraphicsError;

/// Default page size for GPU-exclusive linear allocations (64 KiB).
pub const DEFAULT_GPU_PAGE_SIZE: u64 = 0x10000;

/// Default page size for CPU-writable linear allocations (2 MiB).
pub const DEFAULT_CPU_PAGE_SIZE: u64 = 0x20_0000;

/// Tunables for the device, its allocators and the swap chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Application name, reported in logs.
    pub app_name: String,
    /// Page size of the GPU-exclusive linear allocator.
    pub gpu_page_size: u64,
    /// Page size of the CPU-writable linear allocator.
    pub cpu_page_size: u64,
    /// Descriptors per block of the static (non shader-visible) allocators.
    pub descriptors_per_static_heap: u32,
    /// Descriptors per shader-visible dynamic heap.
    pub descriptors_per_dynamic_heap: u32,
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Number of swap-chain back buffers.
    pub swap_chain_buffer_count: u32,
    /// Emit `begin_event`/`end_event` markers into command lists.
    pub debug_markers: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            app_name: "Stratus".to_string(),
            gpu_page_size: DEFAULT_GPU_PAGE_SIZE,
            cpu_page_size: DEFAULT_CPU_PAGE_SIZE,
            descriptors_per_static_heap: 256,
            descriptors_per_dynamic_heap: 1024,
            frames_in_flight: 2,
            swap_chain_buffer_count: 3,
            debug_markers: cfg!(debug_assertions),
        }
    }
}

impl GraphicsConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the GPU-exclusive page size.
    pub fn with_gpu_page_size(mut self, size: u64) -> Self {
        self.gpu_page_size = size;
        self
    }

    /// Set the CPU-writable page size.
    pub fn with_cpu_page_size(mut self, size: u64) -> Self {
        self.cpu_page_size = size;
        self
    }

    /// Set the number of descriptors per static heap block.
    pub fn with_descriptors_per_static_heap(mut self, count: u32) -> Self {
        self.descriptors_per_static_heap = count;
        self
    }

    /// Set the number of descriptors per dynamic heap.
    pub fn with_descriptors_per_dynamic_heap(mut self, count: u32) -> Self {
        self.descriptors_per_dynamic_heap = count;
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count;
        self
    }

    /// Set the number of swap-chain buffers.
    pub fn with_swap_chain_buffer_count(mut self, count: u32) -> Self {
        self.swap_chain_buffer_count = count;
        self
    }

    /// Enable or disable debug markers.
    pub fn with_debug_markers(mut self, enabled: bool) -> Self {
        self.debug_markers = enabled;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        for (name, size) in [
            ("gpu_page_size", self.gpu_page_size),
            ("cpu_page_size", self.cpu_page_size),
        ] {
            if size == 0 || !size.is_power_of_two() {
                return Err(GraphicsError::Config(format!(
                    "{name} must be a non-zero power of two, got {size}"
                )));
            }
        }
        if self.descriptors_per_static_heap == 0 || self.descriptors_per_dynamic_heap == 0 {
            return Err(GraphicsError::Config(
                "descriptor heap sizes must be non-zero".to_string(),
            ));
        }
        if self.frames_in_flight == 0 {
            return Err(GraphicsError::Config(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if !(2..=16).contains(&self.swap_chain_buffer_count) {
            return Err(GraphicsError::Config(format!(
                "swap_chain_buffer_count must be in 2..=16, got {}",
                self.swap_chain_buffer_count
            )));
        }
        Ok(())
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, GraphicsError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| GraphicsError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, GraphicsError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphicsError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = GraphicsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gpu_page_size, 0x10000);
        assert_eq!(config.cpu_page_size, 0x200000);
        assert_eq!(config.descriptors_per_dynamic_heap, 1024);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GraphicsConfig::from_toml_str(
            r#"
            frames_in_flight = 3
            debug_markers = true
            "#,
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert!(config.debug_markers);
        assert_eq!(config.swap_chain_buffer_count, 3);
    }

    #[test]
    fn test_rejects_bad_page_size() {
        let err = GraphicsConfig::from_toml_str("gpu_page_size = 1000").unwrap_err();
        assert!(matches!(err, GraphicsError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = GraphicsConfig::from_toml_str("frames_in_flight = \"two\"").unwrap_err();
        assert!(matches!(err, GraphicsError::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = GraphicsConfig::new()
            .with_app_name("Test")
            .with_frames_in_flight(0);
        assert_eq!(config.app_name, "Test");
        assert!(config.validate().is_err());
    }
}
