use crate::util::constants::*;
use crate::util::conversions;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, VMBinding};
use atomic::Atomic;
use bytemuck::NoUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The index of a block in the [`BlockTable`].
pub type BlockIndex = usize;

/// The state of a block. NOS and MOS blocks move through
/// `Free -> InUse -> Used` during allocation, and through
/// `Used -> InCompact -> {Compacted, Target}` during compaction. Empty blocks inside a
/// compaction area start as `Dest`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, NoUninit)]
pub enum BlockStatus {
    /// Empty, available to an allocator.
    Free = 0,
    /// Owned by one allocator (a mutator or a collector).
    InUse = 1,
    /// Retired by its allocator. `free` marks the end of its objects.
    Used = 2,
    /// Claimed as a compaction source by one collector.
    InCompact = 3,
    /// All of its objects have target addresses. Its space may be claimed as a target.
    Compacted = 4,
    /// Claimed as a compaction target by one collector.
    Target = 5,
    /// An empty block inside a compaction area, available as a target.
    Dest = 6,
}

/// Side metadata of one block.
pub struct BlockHeader {
    status: Atomic<BlockStatus>,
    /// End of the objects in this block. Only meaningful for `Used` blocks.
    free: Atomic<Address>,
    /// Fill cursor while the block is a compaction target, its new `free` afterwards.
    new_free: Atomic<Address>,
    /// The order in which the block finished target computation.
    compute_seq: AtomicUsize,
    /// Set once every object that lived in this block has been moved out.
    moved_out: AtomicBool,
}

impl BlockHeader {
    fn new(start: Address) -> Self {
        BlockHeader {
            status: Atomic::new(BlockStatus::Free),
            free: Atomic::new(start),
            new_free: Atomic::new(start),
            compute_seq: AtomicUsize::new(usize::MAX),
            moved_out: AtomicBool::new(false),
        }
    }
}

/// Block metadata for the whole reserved heap, indexed by block number.
pub struct BlockTable {
    base: Address,
    headers: Box<[BlockHeader]>,
}

impl BlockTable {
    pub fn new(base: Address, num_blocks: usize) -> Self {
        debug_assert!(base.is_aligned_to(BYTES_IN_BLOCK));
        let headers = (0..num_blocks)
            .map(|i| BlockHeader::new(base + conversions::blocks_to_bytes(i)))
            .collect();
        BlockTable { base, headers }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn start(&self, index: BlockIndex) -> Address {
        self.base + conversions::blocks_to_bytes(index)
    }

    pub fn end(&self, index: BlockIndex) -> Address {
        self.start(index) + BYTES_IN_BLOCK
    }

    pub fn index_of(&self, addr: Address) -> BlockIndex {
        debug_assert!(addr >= self.base);
        (addr - self.base) >> LOG_BYTES_IN_BLOCK
    }

    fn header(&self, index: BlockIndex) -> &BlockHeader {
        &self.headers[index]
    }

    pub fn status(&self, index: BlockIndex) -> BlockStatus {
        self.header(index).status.load(Ordering::Acquire)
    }

    pub fn set_status(&self, index: BlockIndex, status: BlockStatus) {
        self.header(index).status.store(status, Ordering::Release)
    }

    /// Atomically move a block from one status to another. Returns true if this call did it.
    pub fn cas_status(&self, index: BlockIndex, from: BlockStatus, to: BlockStatus) -> bool {
        self.header(index)
            .status
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub fn free(&self, index: BlockIndex) -> Address {
        self.header(index).free.load(Ordering::Acquire)
    }

    pub fn set_free(&self, index: BlockIndex, free: Address) {
        debug_assert!(free >= self.start(index) && free <= self.end(index));
        self.header(index).free.store(free, Ordering::Release)
    }

    pub fn new_free(&self, index: BlockIndex) -> Address {
        self.header(index).new_free.load(Ordering::Acquire)
    }

    pub fn set_new_free(&self, index: BlockIndex, free: Address) {
        self.header(index).new_free.store(free, Ordering::Release)
    }

    pub fn compute_seq(&self, index: BlockIndex) -> usize {
        self.header(index).compute_seq.load(Ordering::Acquire)
    }

    pub fn set_compute_seq(&self, index: BlockIndex, seq: usize) {
        self.header(index).compute_seq.store(seq, Ordering::Release)
    }

    pub fn is_moved_out(&self, index: BlockIndex) -> bool {
        self.header(index).moved_out.load(Ordering::Acquire)
    }

    pub fn set_moved_out(&self, index: BlockIndex, moved: bool) {
        self.header(index).moved_out.store(moved, Ordering::Release)
    }

    /// Bytes occupied by objects in a `Used` block.
    pub fn used_bytes(&self, index: BlockIndex) -> usize {
        self.free(index) - self.start(index)
    }

    /// Return a block to the `Free` state with an empty allocation range.
    pub fn reset(&self, index: BlockIndex) {
        let start = self.start(index);
        let h = self.header(index);
        h.free.store(start, Ordering::Relaxed);
        h.new_free.store(start, Ordering::Relaxed);
        h.compute_seq.store(usize::MAX, Ordering::Relaxed);
        h.moved_out.store(false, Ordering::Relaxed);
        h.status.store(BlockStatus::Free, Ordering::Release);
    }

    /// Visit every object in a block, in address order. The walk covers `[start, free)`.
    pub fn for_each_object<VM: VMBinding>(
        &self,
        index: BlockIndex,
        mut f: impl FnMut(ObjectReference, usize),
    ) {
        let end = self.free(index);
        let mut cursor = self.start(index);
        while cursor < end {
            // Safety: objects are laid out back to back from the block start.
            let object = unsafe { ObjectReference::from_raw_address_unchecked(cursor) };
            let size = conversions::object_size_align(VM::VMObjectModel::get_current_size(object));
            f(object, size);
            cursor += size;
        }
        debug_assert!(cursor == end, "object walk overran block {}", index);
    }
}
