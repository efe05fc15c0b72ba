//! Page-based linear allocator for transient GPU memory.
//!
//! A [`LinearAllocator`] bump-allocates out of fixed-size pages. Pages are
//! never freed piecemeal: when a command context finishes, every page it
//! touched is handed back to the [`LinearAllocatorPageManager`] tagged with
//! the context's fence value, and only becomes reusable once that fence has
//! completed.
//!
//! Two flavors exist:
//!
//! - [`LinearAllocatorType::CpuWritable`]: upload-heap pages the CPU writes
//!   and the GPU reads (dynamic constants, vertices, staging data)
//! - [`LinearAllocatorType::GpuExclusive`]: default-heap scratch pages only
//!   the GPU touches
//!
//! Requests larger than a page get a dedicated "large page" that is freed,
//! not recycled, once its fence completes.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, RawResource};
use crate::command::CommandListManager;
use crate::config::{DEFAULT_CPU_PAGE_SIZE, DEFAULT_GPU_PAGE_SIZE};
use crate::error::GraphicsError;
use crate::memory::RetiredQueue;
use crate::types::{HeapKind, ResourceDesc, ResourceFlags, ResourceState};

/// Round `value` up to a multiple of the power-of-two `alignment`.
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Which memory a linear allocator hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinearAllocatorType {
    /// Default-heap memory, GPU access only.
    GpuExclusive,
    /// Upload-heap memory, CPU writes and GPU reads.
    CpuWritable,
}

impl LinearAllocatorType {
    /// Default page size for this flavor.
    pub const fn default_page_size(self) -> u64 {
        match self {
            LinearAllocatorType::GpuExclusive => DEFAULT_GPU_PAGE_SIZE,
            LinearAllocatorType::CpuWritable => DEFAULT_CPU_PAGE_SIZE,
        }
    }

    fn name(self) -> &'static str {
        match self {
            LinearAllocatorType::GpuExclusive => "GPU-exclusive",
            LinearAllocatorType::CpuWritable => "CPU-writable",
        }
    }
}

/// A page of linear allocator memory. Moves by value between the allocator
/// that fills it and the manager that recycles it.
#[derive(Debug, PartialEq, Eq)]
pub struct LinearPage {
    resource: RawResource,
    size: u64,
    gpu_address: u64,
}

impl LinearPage {
    /// Backing buffer.
    pub fn resource(&self) -> RawResource {
        self.resource
    }

    /// Capacity in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU address of the first byte.
    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }
}

/// A transient allocation carved out of a linear allocator page.
///
/// Valid until the command context that allocated it finishes and its
/// fence completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynAlloc {
    resource: RawResource,
    offset: u64,
    size: u64,
    gpu_address: u64,
    cpu_writable: bool,
}

impl DynAlloc {
    /// Buffer the allocation lives in.
    pub fn resource(&self) -> RawResource {
        self.resource
    }

    /// Byte offset into [`resource`](Self::resource).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in bytes, already rounded to the requested alignment.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU virtual address of the first byte.
    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    /// Whether the CPU may write into the allocation.
    pub fn is_cpu_writable(&self) -> bool {
        self.cpu_writable
    }

    /// Copy `data` into the allocation at byte `offset`.
    pub fn write_bytes(
        &self,
        backend: &dyn GpuBackend,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if !self.cpu_writable {
            return Err(GraphicsError::InvalidParameter(
                "GPU-exclusive allocations cannot be written by the CPU".to_string(),
            ));
        }
        if offset + data.len() as u64 > self.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {} overflows a {} byte allocation",
                data.len(),
                offset,
                self.size
            )));
        }
        backend.write_mapped(self.resource, self.offset + offset, data)
    }

    /// Copy a slice of plain data into the start of the allocation.
    pub fn write<T: bytemuck::Pod>(
        &self,
        backend: &dyn GpuBackend,
        data: &[T],
    ) -> Result<(), GraphicsError> {
        self.write_bytes(backend, 0, bytemuck::cast_slice(data))
    }
}

struct PageManagerInner {
    /// Pooled pages created so far.
    pooled_pages: usize,
    retired: RetiredQueue<LinearPage>,
    available: VecDeque<LinearPage>,
    /// Large pages waiting for their fence before being freed.
    deletion: RetiredQueue<LinearPage>,
}

/// Creates, recycles and frees the pages of one linear allocator flavor.
///
/// Shared by every command context of a device.
pub struct LinearAllocatorPageManager {
    allocator_type: LinearAllocatorType,
    page_size: u64,
    backend: Arc<dyn GpuBackend>,
    commands: Arc<CommandListManager>,
    inner: Mutex<PageManagerInner>,
}

impl LinearAllocatorPageManager {
    /// Create a manager handing out pages of `page_size` bytes.
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        commands: Arc<CommandListManager>,
        allocator_type: LinearAllocatorType,
        page_size: u64,
    ) -> Self {
        debug_assert!(page_size.is_power_of_two());
        Self {
            allocator_type,
            page_size,
            backend,
            commands,
            inner: Mutex::new(PageManagerInner {
                pooled_pages: 0,
                retired: RetiredQueue::new(),
                available: VecDeque::new(),
                deletion: RetiredQueue::new(),
            }),
        }
    }

    /// Flavor of the pages.
    pub fn allocator_type(&self) -> LinearAllocatorType {
        self.allocator_type
    }

    /// Size of pooled pages.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// The backend pages are created on.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Move completed retired pages to the available list and free completed
    /// large pages.
    pub fn release_completed(&self) {
        let mut inner = self.inner.lock();
        let ready = inner
            .retired
            .drain_ready(|fence| self.commands.is_fence_complete(fence));
        inner.available.extend(ready);
        let expired = inner
            .deletion
            .drain_ready(|fence| self.commands.is_fence_complete(fence));
        drop(inner);
        for page in expired {
            log::trace!(
                "Freeing large {} page ({} bytes)",
                self.allocator_type.name(),
                page.size
            );
            self.backend.destroy_resource(page.resource);
        }
    }

    /// Get a page of [`page_size`](Self::page_size) bytes, reusing a retired
    /// one whose fence has completed.
    pub fn request_page(&self) -> Result<LinearPage, GraphicsError> {
        self.release_completed();
        if let Some(page) = self.inner.lock().available.pop_front() {
            log::trace!("Reusing {} page {:?}", self.allocator_type.name(), page.resource);
            return Ok(page);
        }
        let page = self.create_new_page(self.page_size)?;
        let mut inner = self.inner.lock();
        inner.pooled_pages += 1;
        log::debug!(
            "Created {} page #{} ({} bytes)",
            self.allocator_type.name(),
            inner.pooled_pages,
            self.page_size
        );
        Ok(page)
    }

    /// Create a page outside the pool.
    pub fn create_new_page(&self, size: u64) -> Result<LinearPage, GraphicsError> {
        let label = format!("{} linear page", self.allocator_type.name());
        let (desc, heap, state) = match self.allocator_type {
            LinearAllocatorType::CpuWritable => (
                ResourceDesc::buffer(size).with_label(label),
                HeapKind::Upload,
                ResourceState::GENERIC_READ,
            ),
            LinearAllocatorType::GpuExclusive => (
                ResourceDesc::buffer(size)
                    .with_label(label)
                    .with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS),
                HeapKind::Default,
                ResourceState::UNORDERED_ACCESS,
            ),
        };
        let resource = self.backend.create_resource(&desc, heap, state, None)?;
        Ok(LinearPage {
            resource,
            size,
            gpu_address: self.backend.gpu_virtual_address(resource),
        })
    }

    /// Retire pooled pages used by work that signals `fence_value`.
    pub fn discard_pages(&self, fence_value: u64, pages: impl IntoIterator<Item = LinearPage>) {
        let mut inner = self.inner.lock();
        for page in pages {
            inner.retired.retire(fence_value, page);
        }
    }

    /// Schedule large pages for deletion once `fence_value` completes.
    pub fn free_large_pages(&self, fence_value: u64, pages: impl IntoIterator<Item = LinearPage>) {
        self.release_completed();
        let mut inner = self.inner.lock();
        for page in pages {
            inner.deletion.retire(fence_value, page);
        }
    }

    /// Number of pooled pages created so far.
    pub fn pooled_page_count(&self) -> usize {
        self.inner.lock().pooled_pages
    }

    /// Pooled pages ready for reuse.
    pub fn available_page_count(&self) -> usize {
        self.inner.lock().available.len()
    }

    /// Pooled pages waiting on their fence.
    pub fn retired_page_count(&self) -> usize {
        self.inner.lock().retired.len()
    }

    /// Large pages waiting on their fence before being freed.
    pub fn pending_deletion_count(&self) -> usize {
        self.inner.lock().deletion.len()
    }

    /// Free every page the manager holds. The GPU must be idle.
    pub fn destroy(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let pages: Vec<LinearPage> = inner
            .retired
            .drain_all()
            .chain(inner.available.drain(..))
            .chain(inner.deletion.drain_all())
            .collect();
        drop(guard);
        for page in pages {
            self.backend.destroy_resource(page.resource);
        }
    }
}

impl Drop for LinearAllocatorPageManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Bump allocator over pages from a [`LinearAllocatorPageManager`].
///
/// Owned by a single command context.
pub struct LinearAllocator {
    page_manager: Arc<LinearAllocatorPageManager>,
    page_size: u64,
    current_page: Option<LinearPage>,
    current_offset: u64,
    retired_pages: Vec<LinearPage>,
    large_pages: Vec<LinearPage>,
}

impl LinearAllocator {
    /// Alignment used when the caller has no stronger requirement.
    pub const DEFAULT_ALIGNMENT: u64 = 256;

    /// Create an allocator drawing pages from `page_manager`.
    pub fn new(page_manager: Arc<LinearAllocatorPageManager>) -> Self {
        Self {
            page_size: page_manager.page_size(),
            page_manager,
            current_page: None,
            current_offset: 0,
            retired_pages: Vec::new(),
            large_pages: Vec::new(),
        }
    }

    /// Flavor of memory this allocator hands out.
    pub fn allocator_type(&self) -> LinearAllocatorType {
        self.page_manager.allocator_type()
    }

    /// Allocate `size` bytes aligned to `alignment` (a power of two).
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Result<DynAlloc, GraphicsError> {
        debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");
        let aligned_size = align_up(size.max(1), alignment);

        if aligned_size > self.page_size {
            return self.allocate_large_page(aligned_size);
        }

        self.current_offset = align_up(self.current_offset, alignment);
        if self.current_offset + aligned_size > self.page_size
            && let Some(page) = self.current_page.take()
        {
            self.retired_pages.push(page);
        }

        let page = match self.current_page.take() {
            Some(page) => page,
            None => {
                self.current_offset = 0;
                self.page_manager.request_page()?
            }
        };

        let alloc = DynAlloc {
            resource: page.resource,
            offset: self.current_offset,
            size: aligned_size,
            gpu_address: page.gpu_address + self.current_offset,
            cpu_writable: self.allocator_type() == LinearAllocatorType::CpuWritable,
        };
        self.current_offset += aligned_size;
        self.current_page = Some(page);
        Ok(alloc)
    }

    fn allocate_large_page(&mut self, size: u64) -> Result<DynAlloc, GraphicsError> {
        let page = self.page_manager.create_new_page(size)?;
        log::trace!(
            "Large {} page of {} bytes",
            self.allocator_type().name(),
            size
        );
        let alloc = DynAlloc {
            resource: page.resource,
            offset: 0,
            size,
            gpu_address: page.gpu_address,
            cpu_writable: self.allocator_type() == LinearAllocatorType::CpuWritable,
        };
        self.large_pages.push(page);
        Ok(alloc)
    }

    /// Hand every page used so far back to the manager, retired until
    /// `fence_value` completes.
    pub fn cleanup_used_pages(&mut self, fence_value: u64) {
        if let Some(page) = self.current_page.take() {
            self.retired_pages.push(page);
        }
        self.current_offset = 0;
        if !self.retired_pages.is_empty() {
            self.page_manager
                .discard_pages(fence_value, self.retired_pages.drain(..));
        }
        if !self.large_pages.is_empty() {
            self.page_manager
                .free_large_pages(fence_value, self.large_pages.drain(..));
        }
    }

    /// Pages held by this allocator, including the current one.
    pub fn page_count(&self) -> usize {
        self.retired_pages.len() + self.large_pages.len() + usize::from(self.current_page.is_some())
    }

    /// The backend pages live on.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        self.page_manager.backend()
    }
}

impl Drop for LinearAllocator {
    fn drop(&mut self) {
        if self.page_count() > 0 {
            log::warn!(
                "{} linear allocator dropped holding {} pages",
                self.allocator_type().name(),
                self.page_count()
            );
        }
    }
}
