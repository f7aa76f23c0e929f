use crate::policy::block::{BlockIndex, BlockStatus};
use crate::policy::heap::HeapLayout;
use crate::util::constants::BYTES_IN_BLOCK;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Accounting shared by every space.
pub trait Space {
    fn name(&self) -> &'static str;

    /// Bytes of heap currently assigned to the space.
    fn committed_bytes(&self) -> usize;

    /// Bytes occupied by objects (or by blocks handed to allocators).
    fn used_bytes(&self) -> usize;

    fn free_bytes(&self) -> usize {
        self.committed_bytes().saturating_sub(self.used_bytes())
    }

    fn print_usage(&self) {
        debug!(
            "{}: used {} of {}",
            self.name(),
            crate::util::conversions::bytes_to_formatted_string(self.used_bytes()),
            crate::util::conversions::bytes_to_formatted_string(self.committed_bytes())
        );
    }
}

/// Find a `Free` block in `range` starting from `cursor`, claim it for an allocator and zero
/// it. The cursor only moves forward, so a scan over the range costs at most one pass until
/// the owning space resets it.
pub(crate) fn acquire_free_block(
    heap: &HeapLayout,
    cursor: &AtomicUsize,
    range: Range<BlockIndex>,
) -> Option<BlockIndex> {
    let mut i = cursor.load(Ordering::Relaxed).max(range.start);
    while i < range.end {
        if heap
            .blocks
            .cas_status(i, BlockStatus::Free, BlockStatus::InUse)
        {
            cursor.fetch_max(i + 1, Ordering::Relaxed);
            let start = heap.blocks.start(i);
            unsafe { start.zero(BYTES_IN_BLOCK) };
            heap.blocks.set_free(i, start);
            return Some(i);
        }
        i += 1;
    }
    cursor.fetch_max(range.end, Ordering::Relaxed);
    None
}

/// Bytes held by non-free blocks of `range`. Blocks owned by an allocator count as full.
pub(crate) fn used_block_bytes(heap: &HeapLayout, range: Range<BlockIndex>) -> usize {
    range
        .map(|i| match heap.blocks.status(i) {
            BlockStatus::Free | BlockStatus::Dest => 0,
            BlockStatus::Used => heap.blocks.used_bytes(i),
            _ => BYTES_IN_BLOCK,
        })
        .sum()
}

pub(crate) fn free_block_count(heap: &HeapLayout, range: Range<BlockIndex>) -> usize {
    range
        .filter(|i| heap.blocks.status(*i) == BlockStatus::Free)
        .count()
}
