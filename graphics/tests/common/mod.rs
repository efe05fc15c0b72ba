//! Common utilities for runtime integration tests.
//!
//! Every test runs against the simulated [`DummyBackend`]. Tests that need to
//! observe fence gating use a manual backend, whose GPU only moves when the
//! test pumps it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use stratus_graphics::backend::dummy::CompletionMode;
use stratus_graphics::resources::BufferKind;
use stratus_graphics::{DummyBackend, GpuBuffer, GraphicsConfig, GraphicsDevice, ReadbackBuffer};

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Run `f` while a helper thread keeps draining every queue of `backend`.
///
/// Needed around blocking waits on a manual backend.
pub fn pump_while<R>(backend: &Arc<DummyBackend>, f: impl FnOnce() -> R) -> R {
    let stop = AtomicBool::new(false);
    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !stop.load(Ordering::Acquire) {
                backend.advance_all();
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        let result = f();
        stop.store(true, Ordering::Release);
        result
    })
}

// ============================================================================
// Test Context
// ============================================================================

/// A device on a dummy backend, torn down safely in either completion mode.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    device: Option<Arc<GraphicsDevice>>,
}

impl TestContext {
    /// Device whose GPU completes work as soon as it is submitted.
    pub fn new() -> Self {
        Self::with_config(CompletionMode::Immediate, GraphicsConfig::default())
    }

    /// Device whose GPU only moves when the test advances it.
    pub fn manual() -> Self {
        Self::with_config(CompletionMode::Manual, GraphicsConfig::default())
    }

    pub fn with_config(mode: CompletionMode, config: GraphicsConfig) -> Self {
        init_logging();
        let backend = Arc::new(DummyBackend::with_mode(mode));
        let device = GraphicsDevice::with_backend(backend.clone(), config)
            .expect("Failed to create device");
        Self {
            backend,
            device: Some(device),
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        self.device.as_ref().expect("device already dropped")
    }

    /// Create a byte-address buffer, optionally filled with `data`.
    pub fn create_buffer(&self, label: &str, size: u32, data: Option<&[u8]>) -> GpuBuffer {
        let mut buffer = GpuBuffer::new(BufferKind::ByteAddress);
        buffer
            .create(self.device(), label, size / 4, 4, data)
            .expect("Failed to create buffer");
        buffer
    }

    pub fn create_readback_buffer(&self, label: &str, size: u32) -> ReadbackBuffer {
        let mut buffer = ReadbackBuffer::new();
        buffer
            .create(self.device(), label, size, 1)
            .expect("Failed to create readback buffer");
        buffer
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Destroying the device idles the GPU, which a manual backend only
        // reaches while being pumped.
        let device = self.device.take();
        pump_while(&self.backend, move || drop(device));
    }
}

// ============================================================================
// Data
// ============================================================================

/// Deterministic byte pattern for copy tests.
pub fn generate_test_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

/// Small xorshift generator so randomized tests replay from a seed.
pub struct SeededRng(u64);

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform value in `low..=high`.
    pub fn range(&mut self, low: u64, high: u64) -> u64 {
        low + self.next_u64() % (high - low + 1)
    }

    pub fn chance(&mut self, percent: u64) -> bool {
        self.next_u64() % 100 < percent
    }
}
