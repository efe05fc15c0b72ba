//! Hardware queue types and fence value namespacing.

/// Kind of hardware execution queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum QueueType {
    /// Direct queue: graphics, compute and copy work.
    Graphics = 0,
    /// Asynchronous compute queue.
    Compute = 1,
    /// Copy/transfer queue.
    Copy = 2,
}

impl QueueType {
    /// All queue types, in index order.
    pub const ALL: [QueueType; 3] = [QueueType::Graphics, QueueType::Compute, QueueType::Copy];

    /// Index for per-type arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            QueueType::Graphics => "graphics",
            QueueType::Compute => "compute",
            QueueType::Copy => "copy",
        }
    }
}

/// First fence value of a queue's namespace: the queue type in the high byte.
///
/// A queue's fence starts at `fence_base(qt)` and its first submission
/// signals `fence_base(qt) + 1`.
pub const fn fence_base(queue_type: QueueType) -> u64 {
    (queue_type as u64) << 56
}

/// Recover the queue type a fence value was issued by.
pub fn queue_type_from_fence(value: u64) -> Option<QueueType> {
    match value >> 56 {
        0 => Some(QueueType::Graphics),
        1 => Some(QueueType::Compute),
        2 => Some(QueueType::Copy),
        _ => None,
    }
}
