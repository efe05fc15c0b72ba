//! Shader-visible descriptor heaps for per-context descriptor tables.
//!
//! Each command context owns one [`DynamicDescriptorHeap`] for views and one
//! for samplers. Descriptors are staged on the CPU against the bound root
//! signature's table layout, then copied into the shader-visible heap and
//! bound right before a draw or dispatch. Full heaps are retired with the
//! context's fence and recycled through a shared [`DescriptorHeapPool`].

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{BindPoint, Command, GpuBackend, RawCommandList, RawDescriptorHeap};
use crate::command::CommandListManager;
use crate::error::GraphicsError;
use crate::memory::RetiredQueue;
use crate::memory::descriptor_allocator::DescriptorHandle;
use crate::pipeline::{MAX_ROOT_PARAMETERS, RootSignature};
use crate::types::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};

struct HeapPoolInner {
    all: Vec<RawDescriptorHeap>,
    retired: RetiredQueue<RawDescriptorHeap>,
    available: VecDeque<RawDescriptorHeap>,
}

/// Pool of shader-visible heaps of one type, recycled by fence value.
pub struct DescriptorHeapPool {
    heap_type: DescriptorHeapType,
    descriptors_per_heap: u32,
    backend: Arc<dyn GpuBackend>,
    commands: Arc<CommandListManager>,
    inner: Mutex<HeapPoolInner>,
}

impl DescriptorHeapPool {
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        commands: Arc<CommandListManager>,
        heap_type: DescriptorHeapType,
        descriptors_per_heap: u32,
    ) -> Self {
        debug_assert!(heap_type.can_be_shader_visible());
        Self {
            heap_type,
            descriptors_per_heap,
            backend,
            commands,
            inner: Mutex::new(HeapPoolInner {
                all: Vec::new(),
                retired: RetiredQueue::new(),
                available: VecDeque::new(),
            }),
        }
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn descriptors_per_heap(&self) -> u32 {
        self.descriptors_per_heap
    }

    /// Get a heap whose previous users have all completed.
    pub fn request_heap(&self) -> Result<RawDescriptorHeap, GraphicsError> {
        let mut inner = self.inner.lock();
        let ready = inner
            .retired
            .drain_ready(|fence| self.commands.is_fence_complete(fence));
        inner.available.extend(ready);
        if let Some(heap) = inner.available.pop_front() {
            return Ok(heap);
        }
        let heap = self.backend.create_descriptor_heap(
            self.heap_type,
            self.descriptors_per_heap,
            true,
        )?;
        inner.all.push(heap);
        log::debug!(
            "Created shader-visible {:?} heap #{} ({} descriptors)",
            self.heap_type,
            inner.all.len(),
            self.descriptors_per_heap
        );
        Ok(heap)
    }

    /// Retire heaps used by work that signals `fence_value`.
    pub fn discard_heaps(
        &self,
        fence_value: u64,
        heaps: impl IntoIterator<Item = RawDescriptorHeap>,
    ) {
        let mut inner = self.inner.lock();
        for heap in heaps {
            inner.retired.retire(fence_value, heap);
        }
    }

    /// Heaps created so far.
    pub fn size(&self) -> usize {
        self.inner.lock().all.len()
    }

    pub fn retired_count(&self) -> usize {
        self.inner.lock().retired.len()
    }

    /// Destroy every heap. The GPU must be idle.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        inner.retired.drain_all().for_each(drop);
        inner.available.clear();
        for heap in inner.all.drain(..) {
            self.backend.destroy_descriptor_heap(heap);
        }
    }
}

impl Drop for DescriptorHeapPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TableCache {
    /// Index of the table's first handle in the shared handle array.
    start: usize,
    size: u32,
    /// Bit `i` set once descriptor `i` of the table has been staged.
    assigned: u64,
}

impl TableCache {
    /// Descriptors to copy: up to and including the last staged one.
    fn used_size(&self) -> u32 {
        64 - self.assigned.leading_zeros()
    }
}

/// CPU-side staging of descriptor tables for one bind point.
#[derive(Debug, Default)]
struct DescriptorHandleCache {
    table_bitmap: u32,
    stale_bitmap: u32,
    tables: [TableCache; MAX_ROOT_PARAMETERS],
    handles: Vec<CpuDescriptorHandle>,
}

impl DescriptorHandleCache {
    fn clear(&mut self) {
        self.table_bitmap = 0;
        self.stale_bitmap = 0;
        self.handles.clear();
    }

    fn parse_root_signature(&mut self, root_signature: &RootSignature, samplers: bool) {
        self.clear();
        let layout = root_signature.layout();
        self.table_bitmap = layout.table_bitmap(samplers);
        let mut offset = 0;
        for index in bit_indices(self.table_bitmap) {
            let size = layout.descriptor_table_size[index];
            self.tables[index] = TableCache {
                start: offset,
                size,
                assigned: 0,
            };
            offset += size as usize;
        }
        self.handles.resize(offset, CpuDescriptorHandle::NULL);
    }

    fn stage(
        &mut self,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        let index = root_index as usize;
        if index >= MAX_ROOT_PARAMETERS || self.table_bitmap & (1 << index) == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "root parameter {root_index} is not a descriptor table of this heap type"
            )));
        }
        let table = &mut self.tables[index];
        if offset as usize + handles.len() > table.size as usize {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} descriptors at offset {} overflow table {} of size {}",
                handles.len(),
                offset,
                root_index,
                table.size
            )));
        }
        let start = table.start + offset as usize;
        self.handles[start..start + handles.len()].copy_from_slice(handles);
        for i in 0..handles.len() as u32 {
            table.assigned |= 1 << (offset + i);
        }
        self.stale_bitmap |= 1 << index;
        Ok(())
    }

    /// Descriptors needed to commit every stale table.
    fn stale_size(&self) -> u32 {
        bit_indices(self.stale_bitmap)
            .map(|index| self.tables[index].used_size())
            .sum()
    }

    /// Mark every table holding staged descriptors stale, so it is copied
    /// again into a new heap.
    fn unbind_all_valid(&mut self) {
        self.stale_bitmap = bit_indices(self.table_bitmap)
            .filter(|&index| self.tables[index].assigned != 0)
            .fold(0, |bitmap, index| bitmap | (1 << index));
    }
}

fn bit_indices(bitmap: u32) -> impl Iterator<Item = usize> {
    (0..32).filter(move |bit| bitmap & (1 << bit) != 0)
}

#[derive(Debug, Clone, Copy)]
struct CurrentHeap {
    raw: RawDescriptorHeap,
    first: DescriptorHandle,
}

/// Per-context, shader-visible descriptor allocator.
pub struct DynamicDescriptorHeap {
    pool: Arc<DescriptorHeapPool>,
    increment: u32,
    current: Option<CurrentHeap>,
    current_offset: u32,
    retired: Vec<RawDescriptorHeap>,
    graphics_cache: DescriptorHandleCache,
    compute_cache: DescriptorHandleCache,
}

impl DynamicDescriptorHeap {
    pub fn new(pool: Arc<DescriptorHeapPool>) -> Self {
        Self {
            increment: pool.backend.descriptor_increment_size(pool.heap_type),
            pool,
            current: None,
            current_offset: 0,
            retired: Vec::new(),
            graphics_cache: DescriptorHandleCache::default(),
            compute_cache: DescriptorHandleCache::default(),
        }
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.pool.heap_type
    }

    /// Heap currently receiving descriptors.
    pub fn current_heap(&self) -> Option<RawDescriptorHeap> {
        self.current.map(|heap| heap.raw)
    }

    /// Heaps used since the last cleanup, including the current one.
    pub fn used_heap_count(&self) -> usize {
        self.retired.len() + usize::from(self.current.is_some())
    }

    fn cache_mut(&mut self, bind_point: BindPoint) -> &mut DescriptorHandleCache {
        match bind_point {
            BindPoint::Graphics => &mut self.graphics_cache,
            BindPoint::Compute => &mut self.compute_cache,
        }
    }

    fn has_space(&self, count: u32) -> bool {
        self.current.is_some() && self.current_offset + count <= self.pool.descriptors_per_heap
    }

    /// Make sure `count` consecutive slots are free, switching heaps if not.
    /// Returns whether the heap changed.
    fn ensure_space(&mut self, count: u32) -> Result<bool, GraphicsError> {
        if count > self.pool.descriptors_per_heap {
            return Err(GraphicsError::InvalidParameter(format!(
                "{count} descriptors exceed the dynamic heap size of {}",
                self.pool.descriptors_per_heap
            )));
        }
        if self.has_space(count) {
            return Ok(false);
        }
        let raw = self.pool.request_heap()?;
        let backend = &self.pool.backend;
        let next = CurrentHeap {
            raw,
            first: DescriptorHandle {
                cpu: backend.descriptor_heap_cpu_start(raw),
                gpu: backend.descriptor_heap_gpu_start(raw),
            },
        };
        if let Some(previous) = self.current.replace(next) {
            self.retired.push(previous.raw);
        }
        self.current_offset = 0;
        self.graphics_cache.unbind_all_valid();
        self.compute_cache.unbind_all_valid();
        Ok(true)
    }

    fn allocate(&mut self, count: u32) -> Result<(RawDescriptorHeap, DescriptorHandle), GraphicsError> {
        let Some(current) = self.current.filter(|_| self.has_space(count)) else {
            return Err(GraphicsError::Internal(
                "dynamic descriptor allocation without reserved space".to_string(),
            ));
        };
        let handle = current.first.offset(self.current_offset, self.increment);
        self.current_offset += count;
        Ok((current.raw, handle))
    }

    /// Copy one descriptor into the shader-visible heap and return its GPU
    /// handle. Valid until the owning context finishes.
    pub fn upload_direct(
        &mut self,
        handle: CpuDescriptorHandle,
    ) -> Result<DynamicDescriptor, GraphicsError> {
        self.ensure_space(1)?;
        let (heap, dest) = self.allocate(1)?;
        self.pool
            .backend
            .copy_descriptors(self.pool.heap_type, dest.cpu, &[handle]);
        Ok(DynamicDescriptor { gpu: dest.gpu, heap })
    }

    /// Lay out the descriptor table cache for a newly bound root signature.
    pub fn parse_root_signature(&mut self, bind_point: BindPoint, root_signature: &RootSignature) {
        let samplers = self.pool.heap_type == DescriptorHeapType::Sampler;
        self.cache_mut(bind_point)
            .parse_root_signature(root_signature, samplers);
    }

    /// Stage descriptors into table `root_index`, starting at `offset`.
    pub fn set_descriptor_handles(
        &mut self,
        bind_point: BindPoint,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        self.cache_mut(bind_point)
            .stage(root_index, offset, handles)
    }

    pub fn set_graphics_descriptor_handles(
        &mut self,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        self.set_descriptor_handles(BindPoint::Graphics, root_index, offset, handles)
    }

    pub fn set_compute_descriptor_handles(
        &mut self,
        root_index: u32,
        offset: u32,
        handles: &[CpuDescriptorHandle],
    ) -> Result<(), GraphicsError> {
        self.set_descriptor_handles(BindPoint::Compute, root_index, offset, handles)
    }

    /// Whether any table of `bind_point` needs committing.
    pub fn has_stale_tables(&self, bind_point: BindPoint) -> bool {
        match bind_point {
            BindPoint::Graphics => self.graphics_cache.stale_bitmap != 0,
            BindPoint::Compute => self.compute_cache.stale_bitmap != 0,
        }
    }

    /// Reserve room for every stale table of `bind_point`.
    ///
    /// Returns the heap the tables will be written into, which the caller must
    /// bind before [`commit`](Self::commit), or `None` when nothing is stale.
    pub fn prepare_commit(
        &mut self,
        bind_point: BindPoint,
    ) -> Result<Option<RawDescriptorHeap>, GraphicsError> {
        let needed = self.cache_mut(bind_point).stale_size();
        if needed == 0 {
            return Ok(None);
        }
        if self.ensure_space(needed)? {
            // A new heap makes every staged table stale, not only the ones
            // counted above.
            let needed = self.cache_mut(bind_point).stale_size();
            if needed > self.pool.descriptors_per_heap {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{needed} staged descriptors exceed the dynamic heap size of {}",
                    self.pool.descriptors_per_heap
                )));
            }
        }
        Ok(self.current_heap())
    }

    /// Copy stale tables into the heap and bind them on `list`.
    ///
    /// Fails without touching the cache when [`prepare_commit`](Self::prepare_commit)
    /// did not reserve room for every stale table.
    pub fn commit(&mut self, bind_point: BindPoint, list: RawCommandList) -> Result<(), GraphicsError> {
        let needed = self.cache_mut(bind_point).stale_size();
        if needed == 0 {
            self.cache_mut(bind_point).stale_bitmap = 0;
            return Ok(());
        }
        if !self.has_space(needed) {
            return Err(GraphicsError::Internal(format!(
                "committing {needed} descriptors without reserved space"
            )));
        }
        let cache = self.cache_mut(bind_point);
        let stale: Vec<(usize, TableCache)> = bit_indices(cache.stale_bitmap)
            .map(|index| (index, cache.tables[index]))
            .collect();
        cache.stale_bitmap = 0;

        let heap_type = self.pool.heap_type;
        for (root_index, table) in stale {
            let size = table.used_size();
            let (_, dest) = self.allocate(size)?;
            let handles = match bind_point {
                BindPoint::Graphics => &self.graphics_cache.handles,
                BindPoint::Compute => &self.compute_cache.handles,
            };
            let mut i = 0;
            while i < size {
                if table.assigned & (1 << i) == 0 {
                    i += 1;
                    continue;
                }
                let run_start = i;
                while i < size && table.assigned & (1 << i) != 0 {
                    i += 1;
                }
                let src = &handles[table.start + run_start as usize..table.start + i as usize];
                self.pool.backend.copy_descriptors(
                    heap_type,
                    dest.cpu.offset(run_start, self.increment),
                    src,
                );
            }
            self.pool.backend.record(
                list,
                Command::SetRootDescriptorTable {
                    bind_point,
                    root_index: root_index as u32,
                    base: dest.gpu,
                },
            )?;
        }
        Ok(())
    }

    /// Mark every staged table stale so the next commit binds it again.
    pub fn invalidate_bound_tables(&mut self) {
        self.graphics_cache.unbind_all_valid();
        self.compute_cache.unbind_all_valid();
    }

    /// Retire every heap used so far against `fence_value` and reset the
    /// table caches.
    pub fn cleanup_used_heaps(&mut self, fence_value: u64) {
        if let Some(current) = self.current.take() {
            self.retired.push(current.raw);
        }
        self.current_offset = 0;
        if !self.retired.is_empty() {
            self.pool.discard_heaps(fence_value, self.retired.drain(..));
        }
        self.graphics_cache.clear();
        self.compute_cache.clear();
    }
}

/// A descriptor uploaded with [`DynamicDescriptorHeap::upload_direct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicDescriptor {
    pub gpu: GpuDescriptorHandle,
    /// Heap the descriptor was written into; must be bound to use `gpu`.
    pub heap: RawDescriptorHeap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::pipeline::{DescriptorRangeType, RootSignatureDesc, ShaderVisibility};
    use crate::types::{QueueType, SamplerDesc, ViewDesc};

    struct Fixture {
        backend: Arc<DummyBackend>,
        commands: Arc<CommandListManager>,
        pool: Arc<DescriptorHeapPool>,
        staging: RawDescriptorHeap,
    }

    fn fixture(heap_size: u32) -> Fixture {
        let backend = Arc::new(DummyBackend::manual());
        let commands = Arc::new(CommandListManager::new(backend.clone()).unwrap());
        let pool = Arc::new(DescriptorHeapPool::new(
            backend.clone(),
            commands.clone(),
            DescriptorHeapType::CbvSrvUav,
            heap_size,
        ));
        let staging = backend
            .create_descriptor_heap(DescriptorHeapType::CbvSrvUav, 16, false)
            .unwrap();
        Fixture {
            backend,
            commands,
            pool,
            staging,
        }
    }

    fn staged_view(fixture: &Fixture, slot: u32, address: u64) -> CpuDescriptorHandle {
        let handle = fixture
            .backend
            .descriptor_heap_cpu_start(fixture.staging)
            .offset(slot, 32);
        fixture.backend.create_view(
            &ViewDesc::ConstantBuffer {
                address,
                size: 256,
            },
            handle,
        );
        handle
    }

    fn root_signature(fixture: &Fixture) -> RootSignature {
        let desc = RootSignatureDesc::new("tables")
            .with_constant_buffer(0, ShaderVisibility::All)
            .with_descriptor_range(DescriptorRangeType::ShaderResource, 0, 4, ShaderVisibility::All)
            .with_descriptor_range(DescriptorRangeType::Sampler, 0, 1, ShaderVisibility::All);
        let layout = desc.layout().unwrap();
        let raw = fixture.backend.create_root_signature(&desc).unwrap();
        RootSignature::new(raw, desc, layout)
    }

    #[test]
    fn test_upload_direct_copies_descriptor() {
        let f = fixture(8);
        let mut heap = DynamicDescriptorHeap::new(f.pool.clone());
        let src = staged_view(&f, 0, 0x1000);

        let first = heap.upload_direct(src).unwrap();
        let second = heap.upload_direct(src).unwrap();
        assert_ne!(first.gpu, second.gpu);
        assert_eq!(first.heap, second.heap);
        assert_eq!(
            f.backend.view_at_gpu(first.gpu),
            Some(ViewDesc::ConstantBuffer {
                address: 0x1000,
                size: 256
            })
        );
        heap.cleanup_used_heaps(0);
    }

    #[test]
    fn test_full_heap_switches_and_recycles_after_fence() {
        let f = fixture(2);
        let mut heap = DynamicDescriptorHeap::new(f.pool.clone());
        let src = staged_view(&f, 0, 0x1000);

        let a = heap.upload_direct(src).unwrap();
        heap.upload_direct(src).unwrap();
        let c = heap.upload_direct(src).unwrap();
        assert_ne!(a.heap, c.heap);
        assert_eq!(heap.used_heap_count(), 2);

        let fence = f.commands.graphics_queue().increment_fence().unwrap();
        heap.cleanup_used_heaps(fence);
        assert_eq!(f.pool.retired_count(), 2);

        heap.upload_direct(src).unwrap();
        assert_eq!(f.pool.size(), 3);
        heap.cleanup_used_heaps(f.commands.graphics_queue().increment_fence().unwrap());

        f.backend.advance(QueueType::Graphics, 1);
        let recycled = heap.upload_direct(src).unwrap();
        assert_eq!(recycled.heap, a.heap);
        assert_eq!(f.pool.size(), 3);
        heap.cleanup_used_heaps(f.commands.graphics_queue().increment_fence().unwrap());
    }

    #[test]
    fn test_commit_binds_staged_table() {
        let f = fixture(16);
        let mut heap = DynamicDescriptorHeap::new(f.pool.clone());
        let rs = root_signature(&f);
        heap.parse_root_signature(BindPoint::Graphics, &rs);

        let views = [staged_view(&f, 0, 0x1000), staged_view(&f, 1, 0x2000)];
        heap.set_graphics_descriptor_handles(1, 1, &views).unwrap();
        assert!(heap.has_stale_tables(BindPoint::Graphics));
        assert!(!heap.has_stale_tables(BindPoint::Compute));

        let (list, _allocator) = f.commands.create_new_command_list(QueueType::Graphics).unwrap();
        let bound = heap.prepare_commit(BindPoint::Graphics).unwrap();
        assert_eq!(bound, heap.current_heap());
        heap.commit(BindPoint::Graphics, list).unwrap();
        assert!(!heap.has_stale_tables(BindPoint::Graphics));

        let recorded = f.backend.recorded_commands(list);
        let [Command::SetRootDescriptorTable { root_index, base, .. }] = recorded.as_slice() else {
            panic!("unexpected commands {recorded:?}");
        };
        assert_eq!(*root_index, 1);
        assert_eq!(f.backend.view_at_gpu(*base), None);
        assert_eq!(
            f.backend.view_at_gpu(base.offset(2, 32)),
            Some(ViewDesc::ConstantBuffer {
                address: 0x2000,
                size: 256
            })
        );
        heap.cleanup_used_heaps(0);
    }

    fn srv_tables(fixture: &Fixture, count: usize) -> RootSignature {
        let desc = (0..count).fold(RootSignatureDesc::new("srv tables"), |desc, i| {
            desc.with_descriptor_range(
                DescriptorRangeType::ShaderResource,
                i as u32 * 4,
                4,
                ShaderVisibility::All,
            )
        });
        let layout = desc.layout().unwrap();
        let raw = fixture.backend.create_root_signature(&desc).unwrap();
        RootSignature::new(raw, desc, layout)
    }

    fn full_table(fixture: &Fixture, first_slot: u32) -> Vec<CpuDescriptorHandle> {
        (first_slot..first_slot + 4)
            .map(|slot| staged_view(fixture, slot, 0x1000 * (slot as u64 + 1)))
            .collect()
    }

    #[test]
    fn test_heap_switch_rebinds_every_staged_table() {
        let f = fixture(10);
        let mut heap = DynamicDescriptorHeap::new(f.pool.clone());
        let rs = srv_tables(&f, 2);
        heap.parse_root_signature(BindPoint::Graphics, &rs);
        let (first_list, _) = f.commands.create_new_command_list(QueueType::Graphics).unwrap();
        let (second_list, _) = f.commands.create_new_command_list(QueueType::Graphics).unwrap();

        heap.set_graphics_descriptor_handles(0, 0, &full_table(&f, 0))
            .unwrap();
        let first_heap = heap.prepare_commit(BindPoint::Graphics).unwrap();
        heap.commit(BindPoint::Graphics, first_list).unwrap();
        let direct = staged_view(&f, 8, 0x9000);
        for _ in 0..4 {
            heap.upload_direct(direct).unwrap();
        }

        heap.set_graphics_descriptor_handles(1, 0, &full_table(&f, 4))
            .unwrap();
        let second_heap = heap.prepare_commit(BindPoint::Graphics).unwrap();
        assert_ne!(first_heap, second_heap);
        heap.commit(BindPoint::Graphics, second_list).unwrap();
        assert!(!heap.has_stale_tables(BindPoint::Graphics));

        let rebound: Vec<u32> = f
            .backend
            .recorded_commands(second_list)
            .iter()
            .filter_map(|command| match command {
                Command::SetRootDescriptorTable { root_index, .. } => Some(*root_index),
                _ => None,
            })
            .collect();
        assert_eq!(rebound, vec![0, 1]);
        heap.cleanup_used_heaps(0);
    }

    #[test]
    fn test_staged_tables_larger_than_heap_rejected() {
        let f = fixture(10);
        let mut heap = DynamicDescriptorHeap::new(f.pool.clone());
        let rs = srv_tables(&f, 3);
        heap.parse_root_signature(BindPoint::Graphics, &rs);
        let (list, _) = f.commands.create_new_command_list(QueueType::Graphics).unwrap();

        heap.set_graphics_descriptor_handles(0, 0, &full_table(&f, 0))
            .unwrap();
        heap.set_graphics_descriptor_handles(1, 0, &full_table(&f, 4))
            .unwrap();
        heap.prepare_commit(BindPoint::Graphics).unwrap();
        heap.commit(BindPoint::Graphics, list).unwrap();

        heap.set_graphics_descriptor_handles(2, 0, &full_table(&f, 8))
            .unwrap();
        let err = heap.prepare_commit(BindPoint::Graphics).unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidParameter(_)));
        assert!(heap.has_stale_tables(BindPoint::Graphics));
        assert!(matches!(
            heap.commit(BindPoint::Graphics, list),
            Err(GraphicsError::Internal(_))
        ));
        assert!(heap.has_stale_tables(BindPoint::Graphics));
        heap.cleanup_used_heaps(0);
    }

    #[test]
    fn test_staging_outside_table_rejected() {
        let f = fixture(16);
        let mut heap = DynamicDescriptorHeap::new(f.pool.clone());
        let rs = root_signature(&f);
        heap.parse_root_signature(BindPoint::Compute, &rs);
        let view = staged_view(&f, 0, 0x1000);

        assert!(heap.set_compute_descriptor_handles(0, 0, &[view]).is_err());
        assert!(heap.set_compute_descriptor_handles(2, 0, &[view]).is_err());
        assert!(heap.set_compute_descriptor_handles(1, 3, &[view, view]).is_err());
    }

    #[test]
    fn test_sampler_heap_only_sees_sampler_tables() {
        let f = fixture(16);
        let sampler_pool = Arc::new(DescriptorHeapPool::new(
            f.backend.clone(),
            f.commands.clone(),
            DescriptorHeapType::Sampler,
            16,
        ));
        let mut heap = DynamicDescriptorHeap::new(sampler_pool);
        let rs = root_signature(&f);
        heap.parse_root_signature(BindPoint::Graphics, &rs);

        let staging = f
            .backend
            .create_descriptor_heap(DescriptorHeapType::Sampler, 1, false)
            .unwrap();
        let sampler = f.backend.descriptor_heap_cpu_start(staging);
        f.backend
            .create_view(&ViewDesc::Sampler(SamplerDesc::linear_wrap()), sampler);

        assert!(heap.set_descriptor_handles(BindPoint::Graphics, 1, 0, &[sampler]).is_err());
        heap.set_descriptor_handles(BindPoint::Graphics, 2, 0, &[sampler])
            .unwrap();
    }
}
