use crate::policy::block::BlockIndex;
use crate::policy::heap::HeapLayout;
use crate::policy::space::{self, Space};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The mature space (MOS), between LOS and NOS. Minor collections promote NOS survivors into
/// free MOS blocks; major collections compact MOS and NOS together into the bottom of MOS.
pub struct MatureSpace {
    heap: Arc<HeapLayout>,
    alloc_cursor: AtomicUsize,
}

impl MatureSpace {
    pub fn new(heap: Arc<HeapLayout>) -> Self {
        let first = heap.los_end_block();
        MatureSpace {
            heap,
            alloc_cursor: AtomicUsize::new(first),
        }
    }

    pub fn blocks(&self) -> Range<BlockIndex> {
        self.heap.los_end_block()..self.heap.nos_start_block()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks().len()
    }

    /// Hand a zeroed block to a collector (for promotion) or to a mutator (for pretenured
    /// allocation). Returns `None` when MOS has no free block.
    pub fn alloc_block(&self) -> Option<BlockIndex> {
        space::acquire_free_block(&self.heap, &self.alloc_cursor, self.blocks())
    }

    pub fn reset_cursor(&self) {
        self.alloc_cursor
            .store(self.heap.los_end_block(), Ordering::Relaxed);
    }

    pub fn free_blocks(&self) -> usize {
        space::free_block_count(&self.heap, self.blocks())
    }
}

impl Space for MatureSpace {
    fn name(&self) -> &'static str {
        "mos"
    }

    fn committed_bytes(&self) -> usize {
        self.heap.nos_start() - self.heap.los_end()
    }

    fn used_bytes(&self) -> usize {
        space::used_block_bytes(&self.heap, self.blocks())
    }
}
