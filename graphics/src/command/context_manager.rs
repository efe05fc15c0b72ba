//! Pool of reusable command contexts, one free list per queue type.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::command::context::ContextState;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::QueueType;

/// Hands out command contexts and takes them back after they finish.
///
/// Contexts are created on demand and never destroyed before shutdown, so the
/// number alive tracks the peak number recorded concurrently.
#[derive(Debug)]
pub struct ContextManager {
    pools: [Mutex<VecDeque<Box<ContextState>>>; 3],
    created: [AtomicUsize; 3],
    next_id: AtomicU64,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            pools: Default::default(),
            created: Default::default(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Take a free context for `queue_type` and reopen it, or create one.
    pub(crate) fn allocate(
        &self,
        device: &GraphicsDevice,
        queue_type: QueueType,
    ) -> Result<Box<ContextState>, GraphicsError> {
        let pooled = self.pools[queue_type.index()].lock().pop_front();
        if let Some(mut state) = pooled {
            if let Err(e) = state.reset() {
                self.pools[queue_type.index()].lock().push_back(state);
                return Err(e);
            }
            return Ok(state);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = ContextState::new(device, id, queue_type)?;
        self.created[queue_type.index()].fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(state))
    }

    /// Return a submitted context to its free list.
    pub(crate) fn free(&self, state: Box<ContextState>) {
        self.pools[state.queue_type().index()].lock().push_back(state);
    }

    /// Free contexts waiting for reuse.
    pub fn available(&self, queue_type: QueueType) -> usize {
        self.pools[queue_type.index()].lock().len()
    }

    /// Contexts ever created for `queue_type`.
    pub fn created(&self, queue_type: QueueType) -> usize {
        self.created[queue_type.index()].load(Ordering::Relaxed)
    }

    /// Drop every pooled context. Contexts still recording are unaffected.
    pub fn destroy_all(&self) {
        for pool in &self.pools {
            let drained: Vec<_> = pool.lock().drain(..).collect();
            drop(drained);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::GraphicsConfig;

    fn device() -> Arc<GraphicsDevice> {
        GraphicsDevice::with_backend(Arc::new(DummyBackend::new()), GraphicsConfig::default())
            .unwrap()
    }

    #[test]
    fn test_pools_are_per_queue_type() {
        let device = device();
        device.begin_compute("").unwrap().finish(false).unwrap();
        device.begin_copy("").unwrap().finish(false).unwrap();

        let contexts = device.contexts();
        assert_eq!(contexts.available(QueueType::Compute), 1);
        assert_eq!(contexts.available(QueueType::Copy), 1);
        assert_eq!(contexts.available(QueueType::Graphics), 0);

        let ctx = device.begin_graphics("").unwrap();
        assert_eq!(ctx.queue_type(), QueueType::Graphics);
        assert_eq!(contexts.created(QueueType::Graphics), 1);
        ctx.finish(false).unwrap();
    }

    #[test]
    fn test_concurrent_contexts_are_distinct() {
        let device = device();
        let a = device.begin_graphics("A").unwrap();
        let b = device.begin_graphics("B").unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.command_list(), b.command_list());
        b.finish(false).unwrap();
        a.finish(false).unwrap();
        assert_eq!(device.contexts().created(QueueType::Graphics), 2);
        assert_eq!(device.contexts().available(QueueType::Graphics), 2);
    }

    #[test]
    fn test_destroy_all_empties_pools() {
        let device = device();
        device.begin_graphics("").unwrap().finish(true).unwrap();
        device.contexts().destroy_all();
        assert_eq!(device.contexts().available(QueueType::Graphics), 0);
    }
}
