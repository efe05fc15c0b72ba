//! Swap chain management.
//!
//! - [`SwapChain`] - back buffers of a presentation surface, presented from
//!   the graphics queue
//! - [`SwapChainConfiguration`] - size, format, buffering and vsync
//! - [`PresentMode`] - controls vsync behavior
//!
//! # Example
//!
//! ```ignore
//! let config = SwapChainConfiguration::new(1920, 1080).with_present_mode(PresentMode::Fifo);
//! let mut swap_chain = SwapChain::new(&device, config)?;
//!
//! // In render loop:
//! swap_chain.wait_frame_latency()?;
//! let back_buffer = swap_chain.current_back_buffer_mut();
//! // ... render into back_buffer, transition it to PRESENT ...
//! swap_chain.present()?;
//! ```

use std::sync::Arc;

use crate::backend::{RawSwapChain, SwapChainDesc};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::ColorBuffer;
use crate::types::TextureFormat;

/// Presentation mode for the swap chain.
///
/// Controls how frames are synchronized with the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// No synchronization. May cause tearing but has lowest latency.
    Immediate,
    /// VSync enabled. No tearing, but may have higher latency.
    #[default]
    Fifo,
}

impl PresentMode {
    fn sync_interval(self) -> u32 {
        match self {
            PresentMode::Immediate => 0,
            PresentMode::Fifo => 1,
        }
    }
}

/// Configuration for a swap chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapChainConfiguration {
    /// The texture format of the back buffers.
    pub format: TextureFormat,
    /// Width of the surface in pixels.
    pub width: u32,
    /// Height of the surface in pixels.
    pub height: u32,
    /// Presentation mode (vsync behavior).
    pub present_mode: PresentMode,
    /// Number of back buffers.
    pub buffer_count: u32,
    /// Frames the presentation engine may queue before the latency wait blocks.
    pub max_frame_latency: u32,
}

impl SwapChainConfiguration {
    /// Create a new configuration with three back buffers.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            format: TextureFormat::Rgb10A2Unorm,
            width,
            height,
            present_mode: PresentMode::default(),
            buffer_count: 3,
            max_frame_latency: 2,
        }
    }

    /// Set the texture format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the present mode.
    pub fn with_present_mode(mut self, present_mode: PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    /// Set the number of back buffers.
    pub fn with_buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count;
        self
    }

    /// Set the frame latency.
    pub fn with_max_frame_latency(mut self, latency: u32) -> Self {
        self.max_frame_latency = latency;
        self
    }

    fn desc(&self) -> SwapChainDesc {
        SwapChainDesc {
            width: self.width,
            height: self.height,
            format: self.format,
            buffer_count: self.buffer_count,
            max_frame_latency: self.max_frame_latency,
        }
    }
}

/// The back buffers of one presentation surface.
///
/// Back buffers are wrapped in [`ColorBuffer`]s whose render target views are
/// allocated once and rewritten on resize.
pub struct SwapChain {
    device: Arc<GraphicsDevice>,
    raw: RawSwapChain,
    config: SwapChainConfiguration,
    buffers: Vec<ColorBuffer>,
    frame_index: u64,
}

impl SwapChain {
    /// Create a swap chain presenting from the graphics queue.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        config: SwapChainConfiguration,
    ) -> Result<Self, GraphicsError> {
        if config.width == 0 || config.height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "swap chain size must be non-zero, got {}x{}",
                config.width, config.height
            )));
        }
        let queue = device.commands().graphics_queue().raw();
        let raw = device.backend().create_swap_chain(queue, &config.desc())?;
        let mut swap_chain = Self {
            device: device.clone(),
            raw,
            buffers: (0..config.buffer_count)
                .map(|_| ColorBuffer::default())
                .collect(),
            config,
            frame_index: 0,
        };
        swap_chain.acquire_buffers()?;
        log::info!(
            "Swap chain created: {}x{} {:?}, {} buffers",
            swap_chain.config.width,
            swap_chain.config.height,
            swap_chain.config.format,
            swap_chain.config.buffer_count
        );
        Ok(swap_chain)
    }

    fn acquire_buffers(&mut self) -> Result<(), GraphicsError> {
        let backend = self.device.backend();
        for (i, buffer) in self.buffers.iter_mut().enumerate() {
            let raw = backend.swap_chain_buffer(self.raw, i as u32)?;
            buffer.create_from_swap_chain(
                &self.device,
                &format!("Primary swap chain buffer {i}"),
                raw,
                self.config.width,
                self.config.height,
                self.config.format,
            )?;
        }
        Ok(())
    }

    fn release_buffers(&mut self) {
        for buffer in &mut self.buffers {
            buffer.destroy();
        }
    }

    /// Resize every back buffer.
    ///
    /// The GPU must not reference any back buffer; callers idle it first.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "swap chain size must be non-zero, got {width}x{height}"
            )));
        }
        self.release_buffers();
        self.device
            .backend()
            .resize_swap_chain(self.raw, width, height)?;
        self.config.width = width;
        self.config.height = height;
        self.acquire_buffers()?;
        log::info!("Swap chain resized to {width}x{height}");
        Ok(())
    }

    /// Block until the presentation engine accepts another frame.
    pub fn wait_frame_latency(&self) -> Result<(), GraphicsError> {
        crate::profile_scope!("SwapChain::wait_frame_latency");
        self.device.backend().wait_frame_latency(self.raw)
    }

    /// Present the current back buffer, which must be in the present state.
    pub fn present(&mut self) -> Result<(), GraphicsError> {
        self.device
            .backend()
            .present(self.raw, self.config.present_mode.sync_interval())?;
        self.frame_index += 1;
        Ok(())
    }

    /// Index of the back buffer the next frame renders into.
    pub fn current_back_buffer_index(&self) -> usize {
        self.device.backend().current_back_buffer_index(self.raw) as usize
    }

    pub fn current_back_buffer(&self) -> &ColorBuffer {
        &self.buffers[self.current_back_buffer_index()]
    }

    pub fn current_back_buffer_mut(&mut self) -> &mut ColorBuffer {
        let index = self.current_back_buffer_index();
        &mut self.buffers[index]
    }

    pub fn back_buffer(&self, index: usize) -> Option<&ColorBuffer> {
        self.buffers.get(index)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn config(&self) -> &SwapChainConfiguration {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn format(&self) -> TextureFormat {
        self.config.format
    }

    /// Frames presented so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.release_buffers();
        self.device.backend().destroy_swap_chain(self.raw);
    }
}

impl std::fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapChain")
            .field("raw", &self.raw)
            .field("config", &self.config)
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(SwapChain: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::GraphicsConfig;
    use crate::types::{ResourceState, ViewDesc};

    fn swap_chain() -> (Arc<DummyBackend>, SwapChain) {
        let backend = Arc::new(DummyBackend::new());
        let device =
            GraphicsDevice::with_backend(backend.clone(), GraphicsConfig::default()).unwrap();
        let swap_chain = SwapChain::new(&device, SwapChainConfiguration::new(800, 600)).unwrap();
        (backend, swap_chain)
    }

    #[test]
    fn test_back_buffers_start_in_present() {
        let (backend, swap_chain) = swap_chain();
        assert_eq!(swap_chain.buffer_count(), 3);
        let back_buffer = swap_chain.current_back_buffer();
        assert_eq!(back_buffer.usage_state(), ResourceState::PRESENT);
        assert!(matches!(
            backend.view_at(back_buffer.rtv()),
            Some(ViewDesc::RenderTarget { .. })
        ));
    }

    #[test]
    fn test_present_rotates_back_buffer() {
        let (backend, mut swap_chain) = swap_chain();
        assert_eq!(swap_chain.current_back_buffer_index(), 0);
        swap_chain.present().unwrap();
        assert_eq!(swap_chain.current_back_buffer_index(), 1);
        assert_eq!(swap_chain.frame_index(), 1);
        assert_eq!(backend.presents(), 1);
    }

    #[test]
    fn test_resize_keeps_render_target_views() {
        let (backend, mut swap_chain) = swap_chain();
        let rtvs: Vec<_> = (0..3)
            .map(|i| swap_chain.back_buffer(i).unwrap().rtv())
            .collect();
        swap_chain.resize(1280, 720).unwrap();
        assert_eq!(swap_chain.width(), 1280);
        for (i, rtv) in rtvs.into_iter().enumerate() {
            let buffer = swap_chain.back_buffer(i).unwrap();
            assert_eq!(buffer.rtv(), rtv);
            assert_eq!(buffer.width(), 1280);
            let raw = buffer.raw().unwrap();
            assert!(matches!(
                backend.view_at(rtv),
                Some(ViewDesc::RenderTarget { resource, .. }) if resource == raw
            ));
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        let (_backend, mut swap_chain) = swap_chain();
        assert!(matches!(
            swap_chain.resize(0, 720),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }
}
