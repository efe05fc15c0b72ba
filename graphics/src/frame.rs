//! Frame pacing for multiple frames in flight.
//!
//! This module provides [`FramePacer`], which keeps the CPU from recording more
//! than `frames_in_flight` frames ahead of the GPU, and [`FrameLoop`], which
//! drives one frame at a time against a swap chain.
//!
//! # Frame Overlap
//!
//! With 2 frames in flight, the CPU and GPU work in parallel:
//!
//! ```text
//! Frame 0: [CPU record] [finish] ────────────────────────────────────────────►
//!                                [GPU execute frame 0] ──────────────────────►
//!
//! Frame 1:               [CPU record] [finish] ──────────────────────────────►
//!                                             [GPU execute frame 1] ─────────►
//!
//! Frame 2:                            [wait F0] [CPU record] [finish] ───────►
//!                                                            [GPU execute F2] ►
//!
//! Time ──────────────────────────────────────────────────────────────────────►
//! ```
//!
//! Each slot remembers the graphics-queue fence value signalled after its
//! frame was presented. Reusing the slot waits for that value, so transient
//! memory and contexts retired by the frame are recycled in order.
//!
//! # Frame States
//!
//! ```text
//!  Idle ──begin_frame──▶ Acquired ──begin_recording──▶ Recording
//!   ▲                                                      │
//!   └────────────── end_frame (Presenting) ◀───────────────┘
//! ```
//!
//! # Choosing Frames in Flight
//!
//! | Count | Behavior |
//! |-------|----------|
//! | 1 | CPU waits for GPU every frame. Simple but slow. |
//! | 2 | Good balance. CPU can work on N+1 while GPU renders N. |
//! | 3 | More overlap, higher latency. |

use std::sync::Arc;

use crate::command::GraphicsContext;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{ColorBuffer, DepthBuffer};
use crate::swapchain::{SwapChain, SwapChainConfiguration};
use crate::types::{ResourceState, TextureFormat};
use crate::{frame_mark, profile_scope};

/// Where a frame is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameState {
    #[default]
    Idle,
    /// The slot is free and the swap chain accepted a frame.
    Acquired,
    Recording,
    Presenting,
}

/// Paces the CPU against the GPU across a fixed number of frame slots.
///
/// ```text
/// frames_in_flight = 2
///
/// Slot 0: [Frame 0] ──► [Frame 2] ──► [Frame 4] ──►
/// Slot 1: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
/// ```
///
/// `FramePacer` is owned by the render thread.
#[derive(Debug)]
pub struct FramePacer {
    /// Fence value per slot. `None` if the slot hasn't been used yet.
    frame_fences: Vec<Option<u64>>,
    current_slot: usize,
    frames_in_flight: usize,
    /// Total frames started.
    frame_count: u64,
    state: FrameState,
}

impl FramePacer {
    pub fn new(frames_in_flight: usize) -> Result<Self, GraphicsError> {
        if frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            frame_fences: vec![None; frames_in_flight],
            current_slot: 0,
            frames_in_flight,
            frame_count: 0,
            state: FrameState::Idle,
        })
    }

    fn expect_state(&self, expected: FrameState, operation: &str) -> Result<(), GraphicsError> {
        if self.state != expected {
            return Err(GraphicsError::InvalidParameter(format!(
                "{operation} called in frame state {:?}, expected {expected:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Wait until the current slot and the swap chain can take a new frame.
    ///
    /// Blocks on the frame-latency wait first, then on the fence of the
    /// frame that last used this slot. Returns the slot index.
    pub fn begin_frame(
        &mut self,
        device: &GraphicsDevice,
        swap_chain: &SwapChain,
    ) -> Result<usize, GraphicsError> {
        profile_scope!("FramePacer::begin_frame");
        self.expect_state(FrameState::Idle, "begin_frame")?;
        swap_chain.wait_frame_latency()?;
        if let Some(fence) = self.frame_fences[self.current_slot] {
            device.wait_for_fence(fence)?;
        }
        self.frame_count += 1;
        self.state = FrameState::Acquired;
        log::trace!(
            "Begin frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );
        Ok(self.current_slot)
    }

    pub fn begin_recording(&mut self) -> Result<(), GraphicsError> {
        self.expect_state(FrameState::Acquired, "begin_recording")?;
        self.state = FrameState::Recording;
        Ok(())
    }

    /// Present, signal the slot fence and advance to the next slot.
    ///
    /// Returns the slot's fence value.
    pub fn end_frame(
        &mut self,
        device: &GraphicsDevice,
        swap_chain: &mut SwapChain,
    ) -> Result<u64, GraphicsError> {
        profile_scope!("FramePacer::end_frame");
        self.expect_state(FrameState::Recording, "end_frame")?;
        self.state = FrameState::Presenting;
        let presented = swap_chain
            .present()
            .and_then(|()| device.commands().graphics_queue().increment_fence());
        let fence = match presented {
            Ok(fence) => fence,
            Err(e) => {
                self.state = FrameState::Idle;
                return Err(e);
            }
        };

        log::trace!(
            "End frame {} (slot {}, fence {fence:#x})",
            self.frame_count,
            self.current_slot
        );
        self.frame_fences[self.current_slot] = Some(fence);
        self.current_slot = (self.current_slot + 1) % self.frames_in_flight;
        self.state = FrameState::Idle;
        frame_mark!();
        Ok(fence)
    }

    /// Give up on the current frame without presenting. The slot is reused by
    /// the next frame.
    pub fn cancel_frame(&mut self) {
        if self.state != FrameState::Idle {
            log::warn!("Frame {} cancelled in state {:?}", self.frame_count, self.state);
            self.state = FrameState::Idle;
        }
    }

    /// Block until every slot's fence has completed.
    pub fn wait_idle(&self, device: &GraphicsDevice) -> Result<(), GraphicsError> {
        for (slot, fence) in self.frame_fences.iter().enumerate() {
            if let Some(fence) = fence {
                log::trace!("Waiting for slot {slot}...");
                device.wait_for_fence(*fence)?;
            }
        }
        Ok(())
    }

    /// Whether `slot` can be reused without waiting.
    pub fn is_slot_ready(&self, device: &GraphicsDevice, slot: usize) -> bool {
        self.frame_fences
            .get(slot)
            .copied()
            .flatten()
            .is_none_or(|fence| device.is_fence_complete(fence))
    }

    pub fn is_idle(&self, device: &GraphicsDevice) -> bool {
        (0..self.frames_in_flight).all(|slot| self.is_slot_ready(device, slot))
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Fence value recorded for `slot`.
    pub fn slot_fence(&self, slot: usize) -> Option<u64> {
        self.frame_fences.get(slot).copied().flatten()
    }
}

/// Render targets of the frame being recorded.
#[derive(Debug)]
pub struct FrameTargets<'a> {
    /// The back buffer, already in `RENDER_TARGET`.
    pub back_buffer: &'a mut ColorBuffer,
    pub depth_buffer: &'a mut DepthBuffer,
    pub slot: usize,
    pub frame_index: u64,
}

/// Owns the swap chain, the main depth buffer and the pacer, and drives
/// frames through them.
///
/// # Example
///
/// ```ignore
/// let mut frames = FrameLoop::new(&device, SwapChainConfiguration::new(1280, 720), TextureFormat::Depth32Float)?;
/// loop {
///     frames.run_frame(|ctx, targets| {
///         ctx.clear_color(targets.back_buffer, None)?;
///         ctx.clear_depth(targets.depth_buffer)?;
///         // ... draw ...
///         Ok(())
///     })?;
/// }
/// ```
#[derive(Debug)]
pub struct FrameLoop {
    device: Arc<GraphicsDevice>,
    swap_chain: SwapChain,
    depth_buffer: DepthBuffer,
    depth_format: TextureFormat,
    pacer: FramePacer,
}

impl FrameLoop {
    pub fn new(
        device: &Arc<GraphicsDevice>,
        swap_chain_config: SwapChainConfiguration,
        depth_format: TextureFormat,
    ) -> Result<Self, GraphicsError> {
        let swap_chain = SwapChain::new(device, swap_chain_config)?;
        let mut depth_buffer = DepthBuffer::default();
        depth_buffer.create(
            device,
            "Scene depth",
            swap_chain.width(),
            swap_chain.height(),
            depth_format,
        )?;
        Ok(Self {
            pacer: FramePacer::new(device.config().frames_in_flight)?,
            device: device.clone(),
            swap_chain,
            depth_buffer,
            depth_format,
        })
    }

    /// Record and present one frame.
    ///
    /// `record` gets a graphics context and the frame's targets. The back
    /// buffer is transitioned to `RENDER_TARGET` before it runs and back to
    /// `PRESENT` after. Returns the frame's fence value.
    pub fn run_frame<F>(&mut self, record: F) -> Result<u64, GraphicsError>
    where
        F: FnOnce(&mut GraphicsContext, &mut FrameTargets<'_>) -> Result<(), GraphicsError>,
    {
        profile_scope!("FrameLoop::run_frame");
        let slot = self.pacer.begin_frame(&self.device, &self.swap_chain)?;
        if let Err(e) = self.record_frame(slot, record) {
            self.pacer.cancel_frame();
            if e.is_fatal() {
                log::error!("Frame {} failed: {e}", self.pacer.frame_count());
            }
            return Err(e);
        }
        self.pacer.end_frame(&self.device, &mut self.swap_chain)
    }

    fn record_frame<F>(&mut self, slot: usize, record: F) -> Result<u64, GraphicsError>
    where
        F: FnOnce(&mut GraphicsContext, &mut FrameTargets<'_>) -> Result<(), GraphicsError>,
    {
        let mut ctx = self.device.begin_graphics("Frame")?;
        self.pacer.begin_recording()?;
        let frame_index = self.swap_chain.frame_index();
        let back_buffer = self.swap_chain.current_back_buffer_mut();
        ctx.transition_resource(back_buffer, ResourceState::RENDER_TARGET, false)?;

        let mut targets = FrameTargets {
            back_buffer,
            depth_buffer: &mut self.depth_buffer,
            slot,
            frame_index,
        };
        if let Err(e) = record(&mut ctx, &mut targets) {
            // The transitions already recorded must reach the GPU, or the
            // tracked states of the frame's resources go stale.
            let restored =
                ctx.transition_resource(targets.back_buffer, ResourceState::PRESENT, false);
            let submitted = ctx.finish(false);
            if let Err(cleanup) = restored.and(submitted) {
                log::warn!("Failed to submit the commands of a failed frame: {cleanup}");
            }
            return Err(e);
        }

        ctx.transition_resource(targets.back_buffer, ResourceState::PRESENT, false)?;
        ctx.finish(false)
    }

    /// Resize the swap chain and the depth buffer.
    ///
    /// Drains the GPU first; descriptor handles of the back buffers and the
    /// depth buffer stay the same.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        profile_scope!("FrameLoop::resize");
        if width == self.swap_chain.width() && height == self.swap_chain.height() {
            return Ok(());
        }
        self.device.idle_gpu()?;
        self.depth_buffer.destroy();
        self.swap_chain.resize(width, height)?;
        self.depth_buffer.create(
            &self.device,
            "Scene depth",
            width,
            height,
            self.depth_format,
        )
    }

    /// Wait for every frame in flight.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.pacer.wait_idle(&self.device)
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn swap_chain(&self) -> &SwapChain {
        &self.swap_chain
    }

    pub fn depth_buffer(&self) -> &DepthBuffer {
        &self.depth_buffer
    }

    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if let Err(e) = self.device.idle_gpu() {
            log::error!("Failed to drain frames in flight: {e}");
        }
    }
}
