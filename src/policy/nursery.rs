use crate::policy::block::{BlockIndex, BlockStatus};
use crate::policy::heap::HeapLayout;
use crate::policy::space::{self, Space};
use crate::util::Address;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// The nursery (NOS): the top of the committed heap, where mutators allocate new objects in
/// thread-local blocks. A minor collection evacuates the forwarding region of NOS into MOS.
///
/// With partial forwarding, NOS is split into a lower and an upper half and only the half
/// holding the older objects is forwarded; the survivors of the other half stay in place.
/// The halves swap roles after each minor collection.
pub struct NurserySpace {
    heap: Arc<HeapLayout>,
    alloc_cursor: AtomicUsize,
    partial_forward: bool,
    forward_lower: AtomicBool,
    /// Survival ratio of the last minor collection, as a fraction of used NOS bytes, scaled
    /// by 1000.
    survive_permille: AtomicUsize,
}

impl NurserySpace {
    pub fn new(heap: Arc<HeapLayout>, partial_forward: bool) -> Self {
        let first = heap.nos_start_block();
        NurserySpace {
            heap,
            alloc_cursor: AtomicUsize::new(first),
            partial_forward,
            forward_lower: AtomicBool::new(true),
            survive_permille: AtomicUsize::new(0),
        }
    }

    pub fn blocks(&self) -> Range<BlockIndex> {
        self.heap.nos_start_block()..self.heap.committed_end_block()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks().len()
    }

    /// Hand a zeroed block to a mutator. Returns `None` when NOS is exhausted.
    pub fn alloc_block(&self) -> Option<BlockIndex> {
        space::acquire_free_block(&self.heap, &self.alloc_cursor, self.blocks())
    }

    pub fn is_partial_forward(&self) -> bool {
        self.partial_forward
    }

    fn midpoint(&self) -> Address {
        let blocks = self.blocks();
        self.heap.blocks.start(blocks.start + blocks.len() / 2)
    }

    /// The part of NOS whose survivors are evacuated by the current minor collection.
    pub fn forward_range(&self) -> Range<Address> {
        let start = self.heap.nos_start();
        let end = self.heap.committed_end();
        if !self.partial_forward {
            return start..end;
        }
        let mid = self.midpoint();
        if self.forward_lower.load(Ordering::Relaxed) {
            start..mid
        } else {
            mid..end
        }
    }

    #[inline(always)]
    pub fn in_forward_region(&self, addr: Address) -> bool {
        let range = self.forward_range();
        addr >= range.start && addr < range.end
    }

    /// Free the forwarded blocks after a successful minor collection and make the other half
    /// the forwarding region of the next one.
    pub fn release_forwarded_blocks(&self) {
        let range = self.forward_range();
        let first = self.heap.block_index(range.start);
        let end = self.heap.block_index(range.end);
        for i in first..end {
            self.heap.blocks.reset(i);
        }
        if self.partial_forward {
            self.forward_lower.fetch_xor(true, Ordering::Relaxed);
        }
        self.reset_cursor();
    }

    /// Free every NOS block. Used after collections that evacuate all of NOS.
    pub fn release_all_blocks(&self) {
        for i in self.blocks() {
            self.heap.blocks.reset(i);
        }
        self.forward_lower.store(true, Ordering::Relaxed);
        self.reset_cursor();
    }

    pub fn reset_cursor(&self) {
        self.alloc_cursor
            .store(self.heap.nos_start_block(), Ordering::Relaxed);
    }

    pub fn free_blocks(&self) -> usize {
        space::free_block_count(&self.heap, self.blocks())
    }

    pub fn set_survive_ratio(&self, survived: usize, used: usize) {
        let permille = if used == 0 { 0 } else { survived * 1000 / used };
        self.survive_permille.store(permille, Ordering::Relaxed);
    }

    pub fn survive_ratio(&self) -> f64 {
        self.survive_permille.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Blocks that hold objects and are not in the forwarding region.
    pub fn kept_blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        let range = self.forward_range();
        self.blocks().filter(move |i| {
            let start = self.heap.blocks.start(*i);
            !(start >= range.start && start < range.end)
                && self.heap.blocks.status(*i) != BlockStatus::Free
        })
    }
}

impl Space for NurserySpace {
    fn name(&self) -> &'static str {
        "nos"
    }

    fn committed_bytes(&self) -> usize {
        self.heap.committed_end() - self.heap.nos_start()
    }

    fn used_bytes(&self) -> usize {
        space::used_block_bytes(&self.heap, self.blocks())
    }
}
