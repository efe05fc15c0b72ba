//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to hardware but simulates the parts of an
//! explicit graphics API the runtime depends on:
//!
//! - every queue is a FIFO of submitted command lists, GPU-side waits and
//!   fence signals, processed in order
//! - fences only ever move forward
//! - buffers carry real bytes, so copies, uploads and readbacks round-trip
//! - descriptors remember the view written into them
//! - swap-chain resizes fail while back buffers are still referenced
//!
//! In [`CompletionMode::Immediate`] the simulated GPU drains every queue as
//! soon as work is submitted. In [`CompletionMode::Manual`] nothing executes
//! until the test calls [`DummyBackend::advance`] or
//! [`DummyBackend::advance_all`], which makes fence gating observable.
//!
//! CPU writes into, or destruction of, memory still referenced by pending GPU
//! work are counted as hazards (see [`DummyStats::hazards`]).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::GraphicsError;
use crate::pipeline::{PipelineStateDesc, RootSignatureDesc};
use crate::types::{
    ClearValue, CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle, HeapKind, QueueType,
    ResourceDesc, ResourceState, ViewDesc,
};

use super::{
    Command, GpuBackend, RawCommandAllocator, RawCommandList, RawDescriptorHeap, RawFence,
    RawPipelineState, RawQueue, RawResource, RawRootSignature, RawSwapChain, ResourceBarrier,
    SwapChainDesc,
};

/// Byte distance between descriptors of every heap type.
pub const DESCRIPTOR_INCREMENT: u32 = 32;

/// Number of executed command lists kept for inspection.
const HISTORY_CAPACITY: usize = 1024;

const GPU_ADDRESS_BASE: u64 = 0x1_0000_0000;
const GPU_ADDRESS_ALIGNMENT: u64 = 0x10000;
const CPU_DESCRIPTOR_BASE: usize = 0x10_0000;
const GPU_DESCRIPTOR_BASE: u64 = 0x80_0000_0000;

const E_FAIL: i32 = 0x8000_4005_u32 as i32;
const DXGI_ERROR_INVALID_CALL: i32 = 0x887A_0001_u32 as i32;

/// When submitted work completes on the simulated GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Queues drain as soon as work is submitted.
    #[default]
    Immediate,
    /// Queues only drain when [`DummyBackend::advance`] is called.
    Manual,
}

/// Counters describing what the simulated GPU did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// `ResourceBarrier` commands executed.
    pub barrier_calls: u64,
    /// Individual barriers executed across all calls.
    pub barriers: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub copies: u64,
    pub executed_lists: u64,
    pub command_allocators_created: u64,
    pub command_allocator_resets: u64,
    pub presents: u64,
    pub latency_waits: u64,
    /// CPU writes into or frees of memory referenced by pending GPU work.
    pub hazards: u64,
}

/// A command list as the simulated GPU executed it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedList {
    pub queue_type: QueueType,
    pub list: RawCommandList,
    pub commands: Vec<Command>,
}

impl ExecutedList {
    /// Number of barriers across every `ResourceBarrier` command.
    pub fn barrier_count(&self) -> usize {
        self.barriers().count()
    }

    /// Every barrier in the list, in order.
    pub fn barriers(&self) -> impl Iterator<Item = &ResourceBarrier> {
        self.commands.iter().flat_map(|command| match command {
            Command::ResourceBarrier(barriers) => barriers.as_slice(),
            _ => &[][..],
        })
    }
}

enum QueueOp {
    Execute {
        list: RawCommandList,
        allocator: u64,
        commands: Vec<Command>,
        referenced: Vec<u64>,
    },
    Wait {
        fence: u64,
        value: u64,
    },
    Signal {
        fence: u64,
        value: u64,
    },
}

struct QueueState {
    queue_type: QueueType,
    pending: VecDeque<QueueOp>,
}

struct AllocatorState {
    pending_executions: u32,
}

struct ListState {
    queue_type: QueueType,
    allocator: u64,
    open: bool,
    commands: Vec<Command>,
}

struct ResourceEntry {
    desc: ResourceDesc,
    heap: HeapKind,
    data: Vec<u8>,
    gpu_address: u64,
    swap_chain: Option<u64>,
    external_refs: u32,
}

struct HeapEntry {
    heap_type: DescriptorHeapType,
    count: u32,
    cpu_start: usize,
    gpu_start: u64,
}

impl HeapEntry {
    fn cpu_range(&self) -> std::ops::Range<usize> {
        self.cpu_start..self.cpu_start + (self.count * DESCRIPTOR_INCREMENT) as usize
    }
}

struct SwapChainEntry {
    desc: SwapChainDesc,
    buffers: Vec<u64>,
    current: u32,
}

#[derive(Default)]
struct DummyState {
    next_id: u64,
    next_gpu_address: u64,
    next_cpu_descriptor: usize,
    next_gpu_descriptor: u64,
    device_lost: bool,
    memory_budget: Option<u64>,
    allocated_bytes: u64,

    queues: BTreeMap<u64, QueueState>,
    fences: HashMap<u64, u64>,
    allocators: HashMap<u64, AllocatorState>,
    lists: HashMap<u64, ListState>,
    resources: HashMap<u64, ResourceEntry>,
    address_index: BTreeMap<u64, u64>,
    heaps: HashMap<u64, HeapEntry>,
    views: HashMap<usize, ViewDesc>,
    root_signatures: HashMap<u64, RootSignatureDesc>,
    pipeline_states: HashMap<u64, PipelineStateDesc>,
    swap_chains: HashMap<u64, SwapChainEntry>,

    history: VecDeque<ExecutedList>,
    stats: DummyStats,
}

impl DummyState {
    fn new() -> Self {
        Self {
            next_id: 1,
            next_gpu_address: GPU_ADDRESS_BASE,
            next_cpu_descriptor: CPU_DESCRIPTOR_BASE,
            next_gpu_descriptor: GPU_DESCRIPTOR_BASE,
            ..Default::default()
        }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_alive(&self) -> Result<(), GraphicsError> {
        if self.device_lost {
            Err(GraphicsError::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn resource_at_address(&self, address: u64) -> Option<u64> {
        let (&base, &id) = self.address_index.range(..=address).next_back()?;
        let entry = self.resources.get(&id)?;
        (address < base + entry.desc.width.max(1)).then_some(id)
    }

    fn referenced_resources(&self, commands: &[Command]) -> Vec<u64> {
        let mut ids = Vec::new();
        for command in commands {
            match command {
                Command::ResourceBarrier(barriers) => {
                    for barrier in barriers {
                        match barrier {
                            ResourceBarrier::Transition { resource, .. } => {
                                ids.push(resource.as_raw())
                            }
                            ResourceBarrier::Uav { resource } => {
                                ids.extend(resource.map(RawResource::as_raw))
                            }
                            ResourceBarrier::Aliasing { before, after } => {
                                ids.extend(before.map(RawResource::as_raw));
                                ids.extend(after.map(RawResource::as_raw));
                            }
                        }
                    }
                }
                Command::CopyBufferRegion { dest, src, .. }
                | Command::CopyResource { dest, src } => {
                    ids.push(dest.as_raw());
                    ids.push(src.as_raw());
                }
                Command::ClearUnorderedAccess { resource, .. } => ids.push(resource.as_raw()),
                Command::SetVertexBuffers { views, .. } => {
                    ids.extend(views.iter().filter_map(|v| self.resource_at_address(v.address)))
                }
                Command::SetIndexBuffer(view) => ids.extend(self.resource_at_address(view.address)),
                Command::SetRootConstantBufferView { address, .. } => {
                    ids.extend(self.resource_at_address(*address))
                }
                _ => {}
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn is_referenced_by_pending_work(&self, resource: u64) -> bool {
        self.queues.values().any(|queue| {
            queue.pending.iter().any(|op| match op {
                QueueOp::Execute { referenced, .. } => referenced.binary_search(&resource).is_ok(),
                _ => false,
            })
        })
    }

    fn heap_containing(&self, handle: CpuDescriptorHandle) -> Option<&HeapEntry> {
        self.heaps
            .values()
            .find(|heap| heap.cpu_range().contains(&handle.0))
    }

    /// Process up to `budget` operations of one queue. Returns how many ran.
    fn pump_queue(&mut self, queue: u64, budget: usize) -> usize {
        let mut processed = 0;
        while processed < budget {
            let ready = match self.queues.get(&queue).and_then(|q| q.pending.front()) {
                None => false,
                Some(QueueOp::Wait { fence, value }) => {
                    self.fences.get(fence).copied().unwrap_or(u64::MAX) >= *value
                }
                Some(_) => true,
            };
            if !ready {
                break;
            }
            let Some(queue_state) = self.queues.get_mut(&queue) else {
                break;
            };
            let queue_type = queue_state.queue_type;
            let Some(op) = queue_state.pending.pop_front() else {
                break;
            };
            match op {
                QueueOp::Wait { .. } => {}
                QueueOp::Signal { fence, value } => {
                    if let Some(current) = self.fences.get_mut(&fence) {
                        *current = (*current).max(value);
                    }
                }
                QueueOp::Execute {
                    list,
                    allocator,
                    commands,
                    ..
                } => {
                    self.apply_commands(&commands);
                    if let Some(state) = self.allocators.get_mut(&allocator) {
                        state.pending_executions = state.pending_executions.saturating_sub(1);
                    }
                    self.stats.executed_lists += 1;
                    if self.history.len() == HISTORY_CAPACITY {
                        self.history.pop_front();
                    }
                    self.history.push_back(ExecutedList {
                        queue_type,
                        list,
                        commands,
                    });
                }
            }
            processed += 1;
        }
        processed
    }

    fn pump_all(&mut self) -> usize {
        let mut total = 0;
        loop {
            let ids: Vec<u64> = self.queues.keys().copied().collect();
            let progressed: usize = ids.into_iter().map(|id| self.pump_queue(id, usize::MAX)).sum();
            if progressed == 0 {
                return total;
            }
            total += progressed;
        }
    }

    fn apply_commands(&mut self, commands: &[Command]) {
        for command in commands {
            match command {
                Command::ResourceBarrier(barriers) => {
                    self.stats.barrier_calls += 1;
                    self.stats.barriers += barriers.len() as u64;
                }
                Command::DrawInstanced { .. } | Command::DrawIndexedInstanced { .. } => {
                    self.stats.draws += 1
                }
                Command::Dispatch { .. } => self.stats.dispatches += 1,
                Command::CopyBufferRegion {
                    dest,
                    dest_offset,
                    src,
                    src_offset,
                    size,
                } => {
                    self.copy_bytes(*src, *src_offset, *dest, *dest_offset, Some(*size));
                }
                Command::CopyResource { dest, src } => {
                    self.copy_bytes(*src, 0, *dest, 0, None);
                }
                Command::ClearUnorderedAccess {
                    resource, values, ..
                } => {
                    if let Some(entry) = self.resources.get_mut(&resource.as_raw()) {
                        let pattern = values[0].to_le_bytes();
                        for chunk in entry.data.chunks_mut(4) {
                            chunk.copy_from_slice(&pattern[..chunk.len()]);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn copy_bytes(
        &mut self,
        src: RawResource,
        src_offset: u64,
        dest: RawResource,
        dest_offset: u64,
        size: Option<u64>,
    ) {
        self.stats.copies += 1;
        let Some(source) = self.resources.get(&src.as_raw()) else {
            log::error!("DummyBackend: copy from destroyed resource {src:?}");
            self.stats.hazards += 1;
            return;
        };
        let start = src_offset as usize;
        let len = size.map_or(source.data.len().saturating_sub(start), |s| s as usize);
        let Some(bytes) = source.data.get(start..start + len).map(<[u8]>::to_vec) else {
            log::error!("DummyBackend: copy source range out of bounds");
            return;
        };
        let Some(target) = self.resources.get_mut(&dest.as_raw()) else {
            log::error!("DummyBackend: copy into destroyed resource {dest:?}");
            self.stats.hazards += 1;
            return;
        };
        let start = dest_offset as usize;
        let len = bytes.len().min(target.data.len().saturating_sub(start));
        target.data[start..start + len].copy_from_slice(&bytes[..len]);
    }

    fn insert_resource(&mut self, entry: ResourceEntry) -> u64 {
        let id = self.alloc_id();
        if entry.gpu_address != 0 {
            self.address_index.insert(entry.gpu_address, id);
        }
        self.allocated_bytes += entry.desc.byte_size();
        self.resources.insert(id, entry);
        id
    }

    fn remove_resource(&mut self, id: u64) {
        if let Some(entry) = self.resources.remove(&id) {
            self.address_index.remove(&entry.gpu_address);
            self.allocated_bytes = self.allocated_bytes.saturating_sub(entry.desc.byte_size());
        }
    }

    fn create_swap_chain_buffers(&mut self, swap_chain: u64, desc: &SwapChainDesc) -> Vec<u64> {
        (0..desc.buffer_count)
            .map(|i| {
                let resource_desc = ResourceDesc::texture_2d(desc.width, desc.height, desc.format)
                    .with_label(format!("Back buffer {i}"));
                self.insert_resource(ResourceEntry {
                    desc: resource_desc,
                    heap: HeapKind::Default,
                    data: Vec::new(),
                    gpu_address: 0,
                    swap_chain: Some(swap_chain),
                    external_refs: 0,
                })
            })
            .collect()
    }
}

/// Dummy GPU backend.
pub struct DummyBackend {
    mode: CompletionMode,
    hang_timeout: Duration,
    state: Mutex<DummyState>,
    progress: Condvar,
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a new dummy backend whose GPU completes work immediately.
    pub fn new() -> Self {
        Self::with_mode(CompletionMode::Immediate)
    }

    /// Create a dummy backend whose GPU only advances when told to.
    pub fn manual() -> Self {
        Self::with_mode(CompletionMode::Manual)
    }

    /// Create a dummy backend with the given completion mode.
    pub fn with_mode(mode: CompletionMode) -> Self {
        Self {
            mode,
            hang_timeout: Duration::from_secs(5),
            state: Mutex::new(DummyState::new()),
            progress: Condvar::new(),
        }
    }

    /// How long a blocking fence wait may go without progress in manual mode
    /// before the device is declared hung.
    pub fn with_hang_timeout(mut self, timeout: Duration) -> Self {
        self.hang_timeout = timeout;
        self
    }

    /// Limit the bytes of resource memory that may be live at once.
    pub fn with_memory_budget(self, bytes: u64) -> Self {
        self.state.lock().memory_budget = Some(bytes);
        self
    }

    /// The completion mode.
    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    // --- Simulation control -------------------------------------------------

    /// Execute up to `ops` pending operations on every queue of `queue_type`.
    ///
    /// Returns the number of operations processed.
    pub fn advance(&self, queue_type: QueueType, ops: usize) -> usize {
        let mut state = self.state.lock();
        let ids: Vec<u64> = state
            .queues
            .iter()
            .filter(|(_, q)| q.queue_type == queue_type)
            .map(|(&id, _)| id)
            .collect();
        let processed: usize = ids
            .into_iter()
            .map(|id| state.pump_queue(id, ops))
            .sum();
        drop(state);
        self.progress.notify_all();
        processed
    }

    /// Execute everything that can make progress on every queue.
    pub fn advance_all(&self) -> usize {
        let processed = self.state.lock().pump_all();
        self.progress.notify_all();
        processed
    }

    /// Number of operations not yet executed on queues of `queue_type`.
    pub fn pending_ops(&self, queue_type: QueueType) -> usize {
        self.state
            .lock()
            .queues
            .values()
            .filter(|q| q.queue_type == queue_type)
            .map(|q| q.pending.len())
            .sum()
    }

    /// Simulate device removal. Every later device call fails.
    pub fn inject_device_lost(&self) {
        log::warn!("DummyBackend: device lost injected");
        self.state.lock().device_lost = true;
        self.progress.notify_all();
    }

    // --- Inspection ----------------------------------------------------------

    /// Counters accumulated so far.
    pub fn stats(&self) -> DummyStats {
        self.state.lock().stats.clone()
    }

    /// The most recently executed command lists, oldest first.
    pub fn executed_lists(&self) -> Vec<ExecutedList> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Forget the executed-list history.
    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// Commands recorded so far into an open list.
    pub fn recorded_commands(&self, list: RawCommandList) -> Vec<Command> {
        self.state
            .lock()
            .lists
            .get(&list.as_raw())
            .map(|l| l.commands.clone())
            .unwrap_or_default()
    }

    /// Live resources, including swap-chain back buffers.
    pub fn live_resources(&self) -> usize {
        self.state.lock().resources.len()
    }

    /// Live descriptor heaps.
    pub fn live_descriptor_heaps(&self) -> usize {
        self.state.lock().heaps.len()
    }

    /// Live command allocators.
    pub fn live_command_allocators(&self) -> usize {
        self.state.lock().allocators.len()
    }

    /// Live root signatures.
    pub fn live_root_signatures(&self) -> usize {
        self.state.lock().root_signatures.len()
    }

    /// Live pipeline state objects.
    pub fn live_pipeline_states(&self) -> usize {
        self.state.lock().pipeline_states.len()
    }

    /// Whether a resource handle is still alive.
    pub fn is_resource_alive(&self, resource: RawResource) -> bool {
        self.state.lock().resources.contains_key(&resource.as_raw())
    }

    /// Description a resource was created with.
    pub fn resource_desc(&self, resource: RawResource) -> Option<ResourceDesc> {
        self.state
            .lock()
            .resources
            .get(&resource.as_raw())
            .map(|r| r.desc.clone())
    }

    /// View last written into a CPU descriptor.
    pub fn view_at(&self, handle: CpuDescriptorHandle) -> Option<ViewDesc> {
        self.state.lock().views.get(&handle.0).cloned()
    }

    /// View last written into the descriptor behind a GPU handle.
    pub fn view_at_gpu(&self, handle: GpuDescriptorHandle) -> Option<ViewDesc> {
        let state = self.state.lock();
        let heap = state.heaps.values().find(|heap| {
            heap.gpu_start != 0
                && handle.0 >= heap.gpu_start
                && handle.0 < heap.gpu_start + (heap.count * DESCRIPTOR_INCREMENT) as u64
        })?;
        let cpu = heap.cpu_start + (handle.0 - heap.gpu_start) as usize;
        state.views.get(&cpu).cloned()
    }

    /// Number of presents across all swap chains.
    pub fn presents(&self) -> u64 {
        self.state.lock().stats.presents
    }

    fn notify_after_submit(&self, mut state: parking_lot::MutexGuard<'_, DummyState>) {
        if self.mode == CompletionMode::Immediate {
            state.pump_all();
        }
        drop(state);
        self.progress.notify_all();
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_queue(&self, queue_type: QueueType) -> Result<RawQueue, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let id = state.alloc_id();
        state.queues.insert(
            id,
            QueueState {
                queue_type,
                pending: VecDeque::new(),
            },
        );
        log::trace!("DummyBackend: created {} queue {id}", queue_type.name());
        Ok(RawQueue::from_raw(id))
    }

    fn destroy_queue(&self, queue: RawQueue) {
        let mut state = self.state.lock();
        if let Some(q) = state.queues.get(&queue.as_raw())
            && !q.pending.is_empty()
        {
            log::error!("DummyBackend: destroying queue {queue:?} with pending work");
            state.stats.hazards += 1;
        }
        state.queues.remove(&queue.as_raw());
    }

    fn create_fence(&self, initial_value: u64) -> Result<RawFence, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let id = state.alloc_id();
        state.fences.insert(id, initial_value);
        Ok(RawFence::from_raw(id))
    }

    fn destroy_fence(&self, fence: RawFence) {
        self.state.lock().fences.remove(&fence.as_raw());
    }

    fn fence_completed_value(&self, fence: RawFence) -> u64 {
        let state = self.state.lock();
        if state.device_lost {
            return u64::MAX;
        }
        state.fences.get(&fence.as_raw()).copied().unwrap_or(0)
    }

    fn wait_for_fence_value(&self, fence: RawFence, value: u64) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        loop {
            state.check_alive()?;
            let current = state
                .fences
                .get(&fence.as_raw())
                .copied()
                .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown fence {fence:?}")))?;
            if current >= value {
                return Ok(());
            }
            match self.mode {
                CompletionMode::Immediate => {
                    if state.pump_all() == 0 {
                        log::error!(
                            "DummyBackend: fence {fence:?} can never reach {value:#x} (at {current:#x})"
                        );
                        state.device_lost = true;
                        return Err(GraphicsError::DeviceLost);
                    }
                }
                CompletionMode::Manual => {
                    if self
                        .progress
                        .wait_for(&mut state, self.hang_timeout)
                        .timed_out()
                    {
                        log::error!(
                            "DummyBackend: GPU hung waiting for fence {fence:?} to reach {value:#x}"
                        );
                        state.device_lost = true;
                        return Err(GraphicsError::DeviceLost);
                    }
                }
            }
        }
    }

    fn queue_signal(
        &self,
        queue: RawQueue,
        fence: RawFence,
        value: u64,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let q = state
            .queues
            .get_mut(&queue.as_raw())
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown queue {queue:?}")))?;
        q.pending.push_back(QueueOp::Signal {
            fence: fence.as_raw(),
            value,
        });
        self.notify_after_submit(state);
        Ok(())
    }

    fn queue_wait(&self, queue: RawQueue, fence: RawFence, value: u64) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let q = state
            .queues
            .get_mut(&queue.as_raw())
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown queue {queue:?}")))?;
        q.pending.push_back(QueueOp::Wait {
            fence: fence.as_raw(),
            value,
        });
        self.notify_after_submit(state);
        Ok(())
    }

    fn execute_command_list(
        &self,
        queue: RawQueue,
        list: RawCommandList,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let (allocator, commands) = {
            let entry = state.lists.get_mut(&list.as_raw()).ok_or_else(|| {
                GraphicsError::InvalidParameter(format!("unknown command list {list:?}"))
            })?;
            if entry.open {
                return Err(GraphicsError::DeviceCall {
                    call: "ExecuteCommandLists",
                    code: E_FAIL,
                });
            }
            (entry.allocator, std::mem::take(&mut entry.commands))
        };
        let referenced = state.referenced_resources(&commands);
        if let Some(alloc) = state.allocators.get_mut(&allocator) {
            alloc.pending_executions += 1;
        }
        let q = state
            .queues
            .get_mut(&queue.as_raw())
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown queue {queue:?}")))?;
        q.pending.push_back(QueueOp::Execute {
            list,
            allocator,
            commands,
            referenced,
        });
        self.notify_after_submit(state);
        Ok(())
    }

    fn create_command_allocator(
        &self,
        queue_type: QueueType,
    ) -> Result<RawCommandAllocator, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let id = state.alloc_id();
        state.allocators.insert(
            id,
            AllocatorState {
                pending_executions: 0,
            },
        );
        state.stats.command_allocators_created += 1;
        log::trace!(
            "DummyBackend: created {} command allocator {id}",
            queue_type.name()
        );
        Ok(RawCommandAllocator::from_raw(id))
    }

    fn reset_command_allocator(&self, allocator: RawCommandAllocator) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let entry = state.allocators.get(&allocator.as_raw()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown allocator {allocator:?}"))
        })?;
        if entry.pending_executions > 0 {
            log::error!("DummyBackend: reset of allocator {allocator:?} while the GPU uses it");
            state.stats.hazards += 1;
            return Err(GraphicsError::DeviceCall {
                call: "CommandAllocator::Reset",
                code: E_FAIL,
            });
        }
        state.stats.command_allocator_resets += 1;
        Ok(())
    }

    fn destroy_command_allocator(&self, allocator: RawCommandAllocator) {
        let mut state = self.state.lock();
        if state
            .allocators
            .get(&allocator.as_raw())
            .is_some_and(|a| a.pending_executions > 0)
        {
            state.stats.hazards += 1;
        }
        state.allocators.remove(&allocator.as_raw());
    }

    fn create_command_list(
        &self,
        queue_type: QueueType,
        allocator: RawCommandAllocator,
    ) -> Result<RawCommandList, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let id = state.alloc_id();
        state.lists.insert(
            id,
            ListState {
                queue_type,
                allocator: allocator.as_raw(),
                open: true,
                commands: Vec::new(),
            },
        );
        Ok(RawCommandList::from_raw(id))
    }

    fn reset_command_list(
        &self,
        list: RawCommandList,
        allocator: RawCommandAllocator,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let entry = state.lists.get_mut(&list.as_raw()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown command list {list:?}"))
        })?;
        if entry.open {
            return Err(GraphicsError::DeviceCall {
                call: "GraphicsCommandList::Reset",
                code: E_FAIL,
            });
        }
        entry.open = true;
        entry.allocator = allocator.as_raw();
        entry.commands.clear();
        Ok(())
    }

    fn close_command_list(&self, list: RawCommandList) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let entry = state.lists.get_mut(&list.as_raw()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown command list {list:?}"))
        })?;
        if !entry.open {
            return Err(GraphicsError::DeviceCall {
                call: "GraphicsCommandList::Close",
                code: E_FAIL,
            });
        }
        entry.open = false;
        Ok(())
    }

    fn destroy_command_list(&self, list: RawCommandList) {
        self.state.lock().lists.remove(&list.as_raw());
    }

    fn record(&self, list: RawCommandList, command: Command) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let entry = state.lists.get_mut(&list.as_raw()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown command list {list:?}"))
        })?;
        if !entry.open {
            return Err(GraphicsError::InvalidParameter(
                "recording into a closed command list".to_string(),
            ));
        }
        if entry.queue_type == QueueType::Copy
            && !matches!(
                command,
                Command::ResourceBarrier(_)
                    | Command::CopyBufferRegion { .. }
                    | Command::CopyResource { .. }
                    | Command::BeginEvent(_)
                    | Command::EndEvent
                    | Command::SetMarker(_)
            )
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "command not supported on a copy queue: {command:?}"
            )));
        }
        entry.commands.push(command);
        Ok(())
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        heap: HeapKind,
        initial_state: ResourceState,
        _clear_value: Option<ClearValue>,
    ) -> Result<RawResource, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if desc.width == 0 || desc.height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "zero-sized resource {:?}",
                desc.label
            )));
        }
        match heap {
            HeapKind::Upload if initial_state != ResourceState::GENERIC_READ => {
                return Err(GraphicsError::InvalidParameter(
                    "upload heap resources must start in GENERIC_READ".to_string(),
                ));
            }
            HeapKind::Readback if initial_state != ResourceState::COPY_DEST => {
                return Err(GraphicsError::InvalidParameter(
                    "readback heap resources must start in COPY_DEST".to_string(),
                ));
            }
            HeapKind::Upload | HeapKind::Readback if !desc.is_buffer() => {
                return Err(GraphicsError::InvalidParameter(
                    "CPU-visible heaps only hold buffers".to_string(),
                ));
            }
            _ => {}
        }
        if let Some(budget) = state.memory_budget
            && state.allocated_bytes + desc.byte_size() > budget
        {
            log::error!(
                "DummyBackend: out of memory creating {:?} ({} bytes)",
                desc.label,
                desc.byte_size()
            );
            return Err(GraphicsError::OutOfMemory);
        }

        let (gpu_address, data) = if desc.is_buffer() {
            let address = state.next_gpu_address;
            state.next_gpu_address +=
                desc.width.div_ceil(GPU_ADDRESS_ALIGNMENT) * GPU_ADDRESS_ALIGNMENT;
            (address, vec![0u8; desc.width as usize])
        } else {
            (0, Vec::new())
        };

        log::trace!(
            "DummyBackend: creating resource {:?} ({} bytes, {heap:?})",
            desc.label,
            desc.byte_size()
        );
        let id = state.insert_resource(ResourceEntry {
            desc: desc.clone(),
            heap,
            data,
            gpu_address,
            swap_chain: None,
            external_refs: 0,
        });
        Ok(RawResource::from_raw(id))
    }

    fn destroy_resource(&self, resource: RawResource) {
        let mut state = self.state.lock();
        let id = resource.as_raw();
        let Some(entry) = state.resources.get_mut(&id) else {
            log::warn!("DummyBackend: double free of resource {resource:?}");
            return;
        };
        if entry.swap_chain.is_some() {
            entry.external_refs = entry.external_refs.saturating_sub(1);
            return;
        }
        if state.is_referenced_by_pending_work(id) {
            log::error!("DummyBackend: resource {resource:?} freed while the GPU uses it");
            state.stats.hazards += 1;
        }
        state.remove_resource(id);
    }

    fn gpu_virtual_address(&self, resource: RawResource) -> u64 {
        self.state
            .lock()
            .resources
            .get(&resource.as_raw())
            .map_or(0, |r| r.gpu_address)
    }

    fn write_mapped(
        &self,
        resource: RawResource,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let id = resource.as_raw();
        if state.is_referenced_by_pending_work(id) {
            log::error!("DummyBackend: CPU write into {resource:?} while the GPU uses it");
            state.stats.hazards += 1;
        }
        let entry = state.resources.get_mut(&id).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown resource {resource:?}"))
        })?;
        if !entry.heap.is_cpu_writable() {
            return Err(GraphicsError::InvalidParameter(
                "resource is not CPU writable".to_string(),
            ));
        }
        let start = offset as usize;
        let target = entry
            .data
            .get_mut(start..start + data.len())
            .ok_or_else(|| GraphicsError::InvalidParameter("write out of bounds".to_string()))?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(
        &self,
        resource: RawResource,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), GraphicsError> {
        let state = self.state.lock();
        state.check_alive()?;
        let entry = state.resources.get(&resource.as_raw()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown resource {resource:?}"))
        })?;
        if !entry.heap.is_cpu_readable() {
            return Err(GraphicsError::InvalidParameter(
                "resource is not CPU readable".to_string(),
            ));
        }
        let start = offset as usize;
        let source = entry
            .data
            .get(start..start + out.len())
            .ok_or_else(|| GraphicsError::InvalidParameter("read out of bounds".to_string()))?;
        out.copy_from_slice(source);
        Ok(())
    }

    fn descriptor_increment_size(&self, _heap_type: DescriptorHeapType) -> u32 {
        DESCRIPTOR_INCREMENT
    }

    fn create_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
        count: u32,
        shader_visible: bool,
    ) -> Result<RawDescriptorHeap, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if shader_visible && !heap_type.can_be_shader_visible() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{heap_type:?} heaps cannot be shader visible"
            )));
        }
        let id = state.alloc_id();
        let span = (count * DESCRIPTOR_INCREMENT) as usize;
        let cpu_start = state.next_cpu_descriptor;
        state.next_cpu_descriptor += span + 0x1000;
        let gpu_start = if shader_visible {
            let start = state.next_gpu_descriptor;
            state.next_gpu_descriptor += span as u64 + 0x1000;
            start
        } else {
            0
        };
        state.heaps.insert(
            id,
            HeapEntry {
                heap_type,
                count,
                cpu_start,
                gpu_start,
            },
        );
        log::trace!("DummyBackend: created {heap_type:?} heap {id} ({count} descriptors)");
        Ok(RawDescriptorHeap::from_raw(id))
    }

    fn destroy_descriptor_heap(&self, heap: RawDescriptorHeap) {
        let mut state = self.state.lock();
        if let Some(entry) = state.heaps.remove(&heap.as_raw()) {
            let range = entry.cpu_range();
            state.views.retain(|addr, _| !range.contains(addr));
        }
    }

    fn descriptor_heap_cpu_start(&self, heap: RawDescriptorHeap) -> CpuDescriptorHandle {
        self.state
            .lock()
            .heaps
            .get(&heap.as_raw())
            .map_or(CpuDescriptorHandle::NULL, |h| CpuDescriptorHandle(h.cpu_start))
    }

    fn descriptor_heap_gpu_start(&self, heap: RawDescriptorHeap) -> GpuDescriptorHandle {
        self.state
            .lock()
            .heaps
            .get(&heap.as_raw())
            .map_or(GpuDescriptorHandle::NULL, |h| GpuDescriptorHandle(h.gpu_start))
    }

    fn create_view(&self, desc: &ViewDesc, dest: CpuDescriptorHandle) {
        let mut state = self.state.lock();
        let valid = state
            .heap_containing(dest)
            .is_some_and(|heap| heap.heap_type == desc.heap_type());
        if !valid {
            log::error!("DummyBackend: {desc:?} written to invalid descriptor {dest:?}");
            state.stats.hazards += 1;
            return;
        }
        state.views.insert(dest.0, desc.clone());
    }

    fn copy_descriptors(
        &self,
        heap_type: DescriptorHeapType,
        dest: CpuDescriptorHandle,
        src: &[CpuDescriptorHandle],
    ) {
        let mut state = self.state.lock();
        for (i, handle) in src.iter().enumerate() {
            let target = dest.offset(i as u32, DESCRIPTOR_INCREMENT);
            if state
                .heap_containing(target)
                .is_none_or(|heap| heap.heap_type != heap_type)
            {
                log::error!("DummyBackend: descriptor copy out of heap bounds at {target:?}");
                state.stats.hazards += 1;
                continue;
            }
            match state.views.get(&handle.0).cloned() {
                Some(view) => {
                    state.views.insert(target.0, view);
                }
                None => {
                    state.views.remove(&target.0);
                }
            }
        }
    }

    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<RawRootSignature, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let id = state.alloc_id();
        state.root_signatures.insert(id, desc.clone());
        Ok(RawRootSignature::from_raw(id))
    }

    fn destroy_root_signature(&self, root_signature: RawRootSignature) {
        self.state
            .lock()
            .root_signatures
            .remove(&root_signature.as_raw());
    }

    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDesc,
    ) -> Result<RawPipelineState, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if !state
            .root_signatures
            .contains_key(&desc.root_signature().as_raw())
        {
            return Err(GraphicsError::InvalidParameter(
                "pipeline state references an unknown root signature".to_string(),
            ));
        }
        let id = state.alloc_id();
        state.pipeline_states.insert(id, desc.clone());
        Ok(RawPipelineState::from_raw(id))
    }

    fn destroy_pipeline_state(&self, pipeline: RawPipelineState) {
        self.state.lock().pipeline_states.remove(&pipeline.as_raw());
    }

    fn create_swap_chain(
        &self,
        queue: RawQueue,
        desc: &SwapChainDesc,
    ) -> Result<RawSwapChain, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if !state.queues.contains_key(&queue.as_raw()) {
            return Err(GraphicsError::InvalidParameter(format!(
                "unknown queue {queue:?}"
            )));
        }
        let id = state.alloc_id();
        let buffers = state.create_swap_chain_buffers(id, desc);
        state.swap_chains.insert(
            id,
            SwapChainEntry {
                desc: desc.clone(),
                buffers,
                current: 0,
            },
        );
        log::info!(
            "DummyBackend: created swap chain {}x{} with {} buffers",
            desc.width,
            desc.height,
            desc.buffer_count
        );
        Ok(RawSwapChain::from_raw(id))
    }

    fn swap_chain_buffer(
        &self,
        swap_chain: RawSwapChain,
        index: u32,
    ) -> Result<RawResource, GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let id = state
            .swap_chains
            .get(&swap_chain.as_raw())
            .and_then(|sc| sc.buffers.get(index as usize).copied())
            .ok_or(GraphicsError::DeviceCall {
                call: "SwapChain::GetBuffer",
                code: DXGI_ERROR_INVALID_CALL,
            })?;
        if let Some(entry) = state.resources.get_mut(&id) {
            entry.external_refs += 1;
        }
        Ok(RawResource::from_raw(id))
    }

    fn resize_swap_chain(
        &self,
        swap_chain: RawSwapChain,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let (old_buffers, mut desc) = state
            .swap_chains
            .get(&swap_chain.as_raw())
            .map(|sc| (sc.buffers.clone(), sc.desc.clone()))
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!("unknown swap chain {swap_chain:?}"))
            })?;
        let still_referenced = old_buffers.iter().any(|id| {
            state
                .resources
                .get(id)
                .is_some_and(|entry| entry.external_refs > 0)
        });
        if still_referenced || old_buffers.iter().any(|&id| state.is_referenced_by_pending_work(id))
        {
            log::error!("DummyBackend: resize while back buffers are still referenced");
            return Err(GraphicsError::DeviceCall {
                call: "SwapChain::ResizeBuffers",
                code: DXGI_ERROR_INVALID_CALL,
            });
        }
        for id in old_buffers {
            state.remove_resource(id);
        }
        desc.width = width;
        desc.height = height;
        let buffers = state.create_swap_chain_buffers(swap_chain.as_raw(), &desc);
        if let Some(sc) = state.swap_chains.get_mut(&swap_chain.as_raw()) {
            sc.desc = desc;
            sc.buffers = buffers;
            sc.current = 0;
        }
        log::info!("DummyBackend: swap chain resized to {width}x{height}");
        Ok(())
    }

    fn current_back_buffer_index(&self, swap_chain: RawSwapChain) -> u32 {
        self.state
            .lock()
            .swap_chains
            .get(&swap_chain.as_raw())
            .map_or(0, |sc| sc.current)
    }

    fn wait_frame_latency(&self, swap_chain: RawSwapChain) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        if !state.swap_chains.contains_key(&swap_chain.as_raw()) {
            return Err(GraphicsError::InvalidParameter(format!(
                "unknown swap chain {swap_chain:?}"
            )));
        }
        state.stats.latency_waits += 1;
        Ok(())
    }

    fn present(&self, swap_chain: RawSwapChain, _sync_interval: u32) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        state.check_alive()?;
        let sc = state.swap_chains.get_mut(&swap_chain.as_raw()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("unknown swap chain {swap_chain:?}"))
        })?;
        sc.current = (sc.current + 1) % sc.desc.buffer_count.max(1);
        state.stats.presents += 1;
        Ok(())
    }

    fn destroy_swap_chain(&self, swap_chain: RawSwapChain) {
        let mut state = self.state.lock();
        if let Some(sc) = state.swap_chains.remove(&swap_chain.as_raw()) {
            for id in sc.buffers {
                state.remove_resource(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BindPoint;
    use crate::types::fence_base;

    fn submit_empty(backend: &DummyBackend, queue: RawQueue, qt: QueueType) -> RawCommandList {
        let allocator = backend.create_command_allocator(qt).unwrap();
        let list = backend.create_command_list(qt, allocator).unwrap();
        backend.close_command_list(list).unwrap();
        backend.execute_command_list(queue, list).unwrap();
        list
    }

    #[test]
    fn test_dummy_backend_name() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }

    #[test]
    fn test_immediate_mode_signals_on_submit() {
        let backend = DummyBackend::new();
        let queue = backend.create_queue(QueueType::Graphics).unwrap();
        let fence = backend.create_fence(0).unwrap();
        submit_empty(&backend, queue, QueueType::Graphics);
        backend.queue_signal(queue, fence, 1).unwrap();
        assert_eq!(backend.fence_completed_value(fence), 1);
        assert_eq!(backend.stats().executed_lists, 1);
    }

    #[test]
    fn test_manual_mode_holds_work_until_advanced() {
        let backend = DummyBackend::manual();
        let queue = backend.create_queue(QueueType::Compute).unwrap();
        let fence = backend.create_fence(fence_base(QueueType::Compute)).unwrap();
        submit_empty(&backend, queue, QueueType::Compute);
        backend
            .queue_signal(queue, fence, fence_base(QueueType::Compute) + 1)
            .unwrap();

        assert_eq!(backend.pending_ops(QueueType::Compute), 2);
        assert_eq!(
            backend.fence_completed_value(fence),
            fence_base(QueueType::Compute)
        );

        assert_eq!(backend.advance(QueueType::Compute, 1), 1);
        assert_eq!(
            backend.fence_completed_value(fence),
            fence_base(QueueType::Compute)
        );
        backend.advance(QueueType::Compute, 1);
        assert_eq!(
            backend.fence_completed_value(fence),
            fence_base(QueueType::Compute) + 1
        );
    }

    #[test]
    fn test_gpu_wait_blocks_queue() {
        let backend = DummyBackend::manual();
        let graphics = backend.create_queue(QueueType::Graphics).unwrap();
        let compute = backend.create_queue(QueueType::Compute).unwrap();
        let compute_fence = backend.create_fence(0).unwrap();
        let graphics_fence = backend.create_fence(0).unwrap();

        backend.queue_wait(graphics, compute_fence, 1).unwrap();
        backend.queue_signal(graphics, graphics_fence, 1).unwrap();

        assert_eq!(backend.advance(QueueType::Graphics, 10), 0);
        backend.queue_signal(compute, compute_fence, 1).unwrap();
        backend.advance(QueueType::Compute, 1);
        assert_eq!(backend.advance(QueueType::Graphics, 10), 2);
        assert_eq!(backend.fence_completed_value(graphics_fence), 1);
    }

    #[test]
    fn test_unreachable_wait_is_device_lost() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(0).unwrap();
        assert_eq!(
            backend.wait_for_fence_value(fence, 5),
            Err(GraphicsError::DeviceLost)
        );
        assert_eq!(backend.fence_completed_value(fence), u64::MAX);
    }

    #[test]
    fn test_manual_wait_wakes_on_advance() {
        let backend = std::sync::Arc::new(DummyBackend::manual());
        let queue = backend.create_queue(QueueType::Graphics).unwrap();
        let fence = backend.create_fence(0).unwrap();
        backend.queue_signal(queue, fence, 1).unwrap();

        let gpu = backend.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            gpu.advance_all();
        });
        backend.wait_for_fence_value(fence, 1).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_reset_allocator_in_flight_fails() {
        let backend = DummyBackend::manual();
        let queue = backend.create_queue(QueueType::Graphics).unwrap();
        let allocator = backend.create_command_allocator(QueueType::Graphics).unwrap();
        let list = backend
            .create_command_list(QueueType::Graphics, allocator)
            .unwrap();
        backend.close_command_list(list).unwrap();
        backend.execute_command_list(queue, list).unwrap();

        assert!(backend.reset_command_allocator(allocator).is_err());
        assert_eq!(backend.stats().hazards, 1);
        backend.advance_all();
        assert!(backend.reset_command_allocator(allocator).is_ok());
    }

    #[test]
    fn test_copy_moves_bytes() {
        let backend = DummyBackend::new();
        let queue = backend.create_queue(QueueType::Copy).unwrap();
        let upload = backend
            .create_resource(
                &ResourceDesc::buffer(16),
                HeapKind::Upload,
                ResourceState::GENERIC_READ,
                None,
            )
            .unwrap();
        let readback = backend
            .create_resource(
                &ResourceDesc::buffer(16),
                HeapKind::Readback,
                ResourceState::COPY_DEST,
                None,
            )
            .unwrap();
        backend.write_mapped(upload, 4, &[1, 2, 3, 4]).unwrap();

        let allocator = backend.create_command_allocator(QueueType::Copy).unwrap();
        let list = backend.create_command_list(QueueType::Copy, allocator).unwrap();
        backend
            .record(
                list,
                Command::CopyBufferRegion {
                    dest: readback,
                    dest_offset: 0,
                    src: upload,
                    src_offset: 4,
                    size: 4,
                },
            )
            .unwrap();
        backend.close_command_list(list).unwrap();
        backend.execute_command_list(queue, list).unwrap();

        let mut out = [0u8; 4];
        backend.read_mapped(readback, 0, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_queue_rejects_draws() {
        let backend = DummyBackend::new();
        let allocator = backend.create_command_allocator(QueueType::Copy).unwrap();
        let list = backend.create_command_list(QueueType::Copy, allocator).unwrap();
        let result = backend.record(
            list,
            Command::Dispatch { x: 1, y: 1, z: 1 },
        );
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_write_into_in_flight_buffer_is_hazard() {
        let backend = DummyBackend::manual();
        let queue = backend.create_queue(QueueType::Graphics).unwrap();
        let buffer = backend
            .create_resource(
                &ResourceDesc::buffer(256),
                HeapKind::Upload,
                ResourceState::GENERIC_READ,
                None,
            )
            .unwrap();
        let address = backend.gpu_virtual_address(buffer);
        let allocator = backend.create_command_allocator(QueueType::Graphics).unwrap();
        let list = backend
            .create_command_list(QueueType::Graphics, allocator)
            .unwrap();
        backend
            .record(
                list,
                Command::SetRootConstantBufferView {
                    bind_point: BindPoint::Graphics,
                    root_index: 0,
                    address: address + 128,
                },
            )
            .unwrap();
        backend.close_command_list(list).unwrap();
        backend.execute_command_list(queue, list).unwrap();

        backend.write_mapped(buffer, 0, &[1]).unwrap();
        assert_eq!(backend.stats().hazards, 1);

        backend.advance_all();
        backend.write_mapped(buffer, 0, &[1]).unwrap();
        assert_eq!(backend.stats().hazards, 1);
    }

    #[test]
    fn test_resize_requires_released_buffers() {
        let backend = DummyBackend::new();
        let queue = backend.create_queue(QueueType::Graphics).unwrap();
        let desc = SwapChainDesc {
            width: 640,
            height: 480,
            format: crate::types::TextureFormat::Rgba8Unorm,
            buffer_count: 2,
            max_frame_latency: 2,
        };
        let sc = backend.create_swap_chain(queue, &desc).unwrap();
        let buffer = backend.swap_chain_buffer(sc, 0).unwrap();

        assert!(backend.resize_swap_chain(sc, 800, 600).is_err());
        backend.destroy_resource(buffer);
        backend.resize_swap_chain(sc, 800, 600).unwrap();

        let buffer = backend.swap_chain_buffer(sc, 1).unwrap();
        assert_eq!(backend.resource_desc(buffer).unwrap().width, 800);
    }

    #[test]
    fn test_present_rotates_back_buffers() {
        let backend = DummyBackend::new();
        let queue = backend.create_queue(QueueType::Graphics).unwrap();
        let desc = SwapChainDesc {
            width: 4,
            height: 4,
            format: crate::types::TextureFormat::Bgra8Unorm,
            buffer_count: 3,
            max_frame_latency: 1,
        };
        let sc = backend.create_swap_chain(queue, &desc).unwrap();
        for expected in [1, 2, 0, 1] {
            backend.present(sc, 1).unwrap();
            assert_eq!(backend.current_back_buffer_index(sc), expected);
        }
    }

    #[test]
    fn test_descriptor_views_and_copies() {
        let backend = DummyBackend::new();
        let staging = backend
            .create_descriptor_heap(DescriptorHeapType::CbvSrvUav, 4, false)
            .unwrap();
        let visible = backend
            .create_descriptor_heap(DescriptorHeapType::CbvSrvUav, 4, true)
            .unwrap();
        let src = backend.descriptor_heap_cpu_start(staging);
        let view = ViewDesc::ConstantBuffer {
            address: 0x1000,
            size: 256,
        };
        backend.create_view(&view, src);

        let dest = backend.descriptor_heap_cpu_start(visible);
        backend.copy_descriptors(DescriptorHeapType::CbvSrvUav, dest.offset(1, 32), &[src]);
        let gpu = backend.descriptor_heap_gpu_start(visible).offset(1, 32);
        assert_eq!(backend.view_at_gpu(gpu), Some(view));
        assert_eq!(
            backend.descriptor_heap_gpu_start(staging),
            GpuDescriptorHandle::NULL
        );
    }

    #[test]
    fn test_memory_budget() {
        let backend = DummyBackend::new().with_memory_budget(1024);
        let desc = ResourceDesc::buffer(1000);
        let first = backend
            .create_resource(&desc, HeapKind::Default, ResourceState::COMMON, None)
            .unwrap();
        assert_eq!(
            backend.create_resource(&desc, HeapKind::Default, ResourceState::COMMON, None),
            Err(GraphicsError::OutOfMemory)
        );
        backend.destroy_resource(first);
        assert!(
            backend
                .create_resource(&desc, HeapKind::Default, ResourceState::COMMON, None)
                .is_ok()
        );
    }

    #[test]
    fn test_injected_device_lost() {
        let backend = DummyBackend::new();
        backend.inject_device_lost();
        assert_eq!(
            backend.create_queue(QueueType::Graphics),
            Err(GraphicsError::DeviceLost)
        );
    }
}
