use crate::policy::block::{BlockIndex, BlockStatus};
use crate::policy::heap::HeapLayout;
use crate::util::Address;

/// A bump pointer into one block owned by a mutator or a collector.
#[derive(Debug)]
pub struct BumpPointer {
    block: Option<BlockIndex>,
    cursor: Address,
    limit: Address,
}

impl Default for BumpPointer {
    fn default() -> Self {
        BumpPointer {
            block: None,
            cursor: Address::ZERO,
            limit: Address::ZERO,
        }
    }
}

impl BumpPointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self) -> Option<BlockIndex> {
        self.block
    }

    /// Allocate `size` bytes in the current block, or return `None` if it does not fit.
    #[inline(always)]
    pub fn alloc(&mut self, size: usize) -> Option<Address> {
        let start = self.cursor;
        let new_cursor = start + size;
        if self.block.is_none() || new_cursor > self.limit {
            None
        } else {
            self.cursor = new_cursor;
            Some(start)
        }
    }

    /// Undo the last allocation of `size` bytes at `addr`. Returns false if it is not the last
    /// allocation.
    pub fn rewind(&mut self, addr: Address, size: usize) -> bool {
        if self.block.is_some() && addr + size == self.cursor {
            self.cursor = addr;
            true
        } else {
            false
        }
    }

    /// Start allocating in a freshly acquired block. The current block, if any, is retired
    /// first.
    pub fn rebind(&mut self, heap: &HeapLayout, block: BlockIndex) {
        self.retire(heap);
        self.block = Some(block);
        self.cursor = heap.blocks.start(block);
        self.limit = heap.blocks.end(block);
    }

    /// Give the current block back as `Used`, recording how far it was filled.
    pub fn retire(&mut self, heap: &HeapLayout) {
        if let Some(b) = self.block.take() {
            debug_assert_eq!(heap.blocks.status(b), BlockStatus::InUse);
            heap.blocks.set_free(b, self.cursor);
            heap.blocks.set_status(b, BlockStatus::Used);
            self.cursor = Address::ZERO;
            self.limit = Address::ZERO;
        }
    }
}
