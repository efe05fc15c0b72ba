//! CPU-only descriptor allocation.
//!
//! [`DescriptorAllocator`] hands out descriptors for views that live as long
//! as their resource (render targets, depth views, SRV/UAV staging copies).
//! It grows by whole heaps and never frees individual descriptors.
//!
//! [`UserDescriptorHeap`] is a fixed-size, optionally shader-visible heap for
//! callers that manage their own descriptor tables.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, RawDescriptorHeap};
use crate::error::GraphicsError;
use crate::types::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};

struct AllocatorInner {
    heaps: Vec<RawDescriptorHeap>,
    current: CpuDescriptorHandle,
    remaining: u32,
}

/// Linear allocator of CPU descriptors of one heap type.
pub struct DescriptorAllocator {
    heap_type: DescriptorHeapType,
    descriptors_per_heap: u32,
    increment: u32,
    backend: Arc<dyn GpuBackend>,
    inner: Mutex<AllocatorInner>,
}

impl DescriptorAllocator {
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        heap_type: DescriptorHeapType,
        descriptors_per_heap: u32,
    ) -> Self {
        Self {
            heap_type,
            descriptors_per_heap,
            increment: backend.descriptor_increment_size(heap_type),
            backend,
            inner: Mutex::new(AllocatorInner {
                heaps: Vec::new(),
                current: CpuDescriptorHandle::NULL,
                remaining: 0,
            }),
        }
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    /// Allocate `count` consecutive descriptors.
    pub fn allocate(&self, count: u32) -> Result<CpuDescriptorHandle, GraphicsError> {
        if count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "descriptor allocation of zero descriptors".to_string(),
            ));
        }
        let mut inner = self.inner.lock();
        if inner.current.is_null() || inner.remaining < count {
            let size = self.descriptors_per_heap.max(count);
            let heap = self
                .backend
                .create_descriptor_heap(self.heap_type, size, false)?;
            inner.heaps.push(heap);
            inner.current = self.backend.descriptor_heap_cpu_start(heap);
            inner.remaining = size;
            log::debug!(
                "Created {:?} descriptor heap #{} ({} descriptors)",
                self.heap_type,
                inner.heaps.len(),
                size
            );
        }
        let handle = inner.current;
        inner.current = handle.offset(count, self.increment);
        inner.remaining -= count;
        Ok(handle)
    }

    /// Number of backing heaps created so far.
    pub fn heap_count(&self) -> usize {
        self.inner.lock().heaps.len()
    }

    /// Destroy every heap. Descriptors handed out become invalid.
    pub fn destroy_all(&self) {
        let mut inner = self.inner.lock();
        for heap in inner.heaps.drain(..) {
            self.backend.destroy_descriptor_heap(heap);
        }
        inner.current = CpuDescriptorHandle::NULL;
        inner.remaining = 0;
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

/// A pair of CPU and GPU handles to the same descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DescriptorHandle {
    pub cpu: CpuDescriptorHandle,
    pub gpu: GpuDescriptorHandle,
}

impl DescriptorHandle {
    pub fn is_null(&self) -> bool {
        self.cpu.is_null()
    }

    pub fn is_shader_visible(&self) -> bool {
        !self.gpu.is_null()
    }

    pub fn offset(self, count: u32, increment: u32) -> Self {
        Self {
            cpu: self.cpu.offset(count, increment),
            gpu: if self.gpu.is_null() {
                self.gpu
            } else {
                self.gpu.offset(count, increment)
            },
        }
    }
}

/// A single descriptor heap with a bump allocator over its slots.
pub struct UserDescriptorHeap {
    heap: RawDescriptorHeap,
    heap_type: DescriptorHeapType,
    capacity: u32,
    increment: u32,
    first: DescriptorHandle,
    allocated: Mutex<u32>,
    backend: Arc<dyn GpuBackend>,
}

impl UserDescriptorHeap {
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        heap_type: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<Self, GraphicsError> {
        let heap = backend.create_descriptor_heap(heap_type, capacity, shader_visible)?;
        let first = DescriptorHandle {
            cpu: backend.descriptor_heap_cpu_start(heap),
            gpu: backend.descriptor_heap_gpu_start(heap),
        };
        Ok(Self {
            heap,
            heap_type,
            capacity,
            increment: backend.descriptor_increment_size(heap_type),
            first,
            allocated: Mutex::new(0),
            backend,
        })
    }

    pub fn raw(&self) -> RawDescriptorHeap {
        self.heap
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Slots not yet handed out.
    pub fn free_count(&self) -> u32 {
        self.capacity - *self.allocated.lock()
    }

    /// Reserve `count` consecutive slots.
    pub fn alloc(&self, count: u32) -> Result<DescriptorHandle, GraphicsError> {
        let mut allocated = self.allocated.lock();
        if count == 0 || *allocated + count > self.capacity {
            return Err(GraphicsError::InvalidParameter(format!(
                "{:?} heap cannot fit {} more descriptors ({} free)",
                self.heap_type,
                count,
                self.capacity - *allocated
            )));
        }
        let handle = self.first.offset(*allocated, self.increment);
        *allocated += count;
        Ok(handle)
    }

    /// Handle of slot `index`.
    pub fn handle_at(&self, index: u32) -> DescriptorHandle {
        debug_assert!(index < self.capacity);
        self.first.offset(index, self.increment)
    }

    /// Whether `handle` points into this heap.
    pub fn contains(&self, handle: DescriptorHandle) -> bool {
        let start = self.first.cpu.0;
        let end = start + (self.capacity * self.increment) as usize;
        (start..end).contains(&handle.cpu.0)
    }
}

impl Drop for UserDescriptorHeap {
    fn drop(&mut self) {
        self.backend.destroy_descriptor_heap(self.heap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DESCRIPTOR_INCREMENT, DummyBackend};

    #[test]
    fn test_allocations_are_consecutive() {
        let backend = Arc::new(DummyBackend::new());
        let allocator = DescriptorAllocator::new(backend, DescriptorHeapType::Rtv, 8);
        let a = allocator.allocate(2).unwrap();
        let b = allocator.allocate(1).unwrap();
        assert_eq!(b, a.offset(2, DESCRIPTOR_INCREMENT));
        assert_eq!(allocator.heap_count(), 1);
    }

    #[test]
    fn test_grows_by_whole_heaps() {
        let backend = Arc::new(DummyBackend::new());
        let allocator =
            DescriptorAllocator::new(backend.clone(), DescriptorHeapType::CbvSrvUav, 4);
        allocator.allocate(3).unwrap();
        allocator.allocate(3).unwrap();
        allocator.allocate(16).unwrap();
        assert_eq!(allocator.heap_count(), 3);
        assert_eq!(backend.live_descriptor_heaps(), 3);
        drop(allocator);
        assert_eq!(backend.live_descriptor_heaps(), 0);
    }

    #[test]
    fn test_zero_count_rejected() {
        let backend = Arc::new(DummyBackend::new());
        let allocator = DescriptorAllocator::new(backend, DescriptorHeapType::Dsv, 4);
        assert!(allocator.allocate(0).is_err());
    }

    #[test]
    fn test_user_heap_bounds() {
        let backend = Arc::new(DummyBackend::new());
        let heap =
            UserDescriptorHeap::new(backend, DescriptorHeapType::CbvSrvUav, 4, true).unwrap();
        let first = heap.alloc(3).unwrap();
        assert!(first.is_shader_visible());
        assert!(heap.contains(first));
        assert_eq!(heap.free_count(), 1);
        assert!(heap.alloc(2).is_err());
        let last = heap.alloc(1).unwrap();
        assert_eq!(last, heap.handle_at(3));
    }
}
