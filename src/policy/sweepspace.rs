use crate::policy::block::BlockIndex;
use crate::policy::heap::HeapLayout;
use crate::policy::space::Space;
use crate::util::constants::*;
use crate::util::header::{self, MarkParity};
use crate::util::{Address, ObjectReference};
use atomic::Atomic;
use bytemuck::NoUninit;
use crossbeam::queue::SegQueue;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Slot sizes of the size classes, in bytes.
pub const SIZE_CLASSES: [usize; 19] = [
    16, 24, 32, 48, 64, 80, 96, 128, 160, 192, 256, 320, 384, 512, 768, 1024, 2048, 4096, 8192,
];
pub const NUM_SIZE_CLASSES: usize = SIZE_CLASSES.len();

const MAX_SLOTS: usize = BYTES_IN_BLOCK / SIZE_CLASSES[0];
const BITMAP_WORDS: usize = MAX_SLOTS / 64;

/// The size class for an object of `size` bytes, if it fits in one.
pub fn size_class_of(size: usize) -> Option<usize> {
    SIZE_CLASSES.iter().position(|c| *c >= size)
}

/// The state of a chunk. A chunk is one block formatted for one size class.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, NoUninit)]
pub enum ChunkState {
    /// Not formatted. Can be formatted for any size class.
    Free = 0,
    /// Cached by one mutator, which allocates into its free slots.
    Owned = 1,
    /// Has free slots and sits on its size class's queue.
    Available = 2,
    /// No free slots, or released without being queued.
    Full = 3,
    /// Being swept or compacted by one collector.
    Sweeping = 4,
}

struct ChunkInfo {
    state: Atomic<ChunkState>,
    size_class: AtomicUsize,
    /// The sweep cycle that last swept this chunk.
    swept_cycle: AtomicUsize,
    alloc_bits: [AtomicU64; BITMAP_WORDS],
}

impl ChunkInfo {
    fn new() -> Self {
        ChunkInfo {
            state: Atomic::new(ChunkState::Free),
            size_class: AtomicUsize::new(0),
            swept_cycle: AtomicUsize::new(0),
            alloc_bits: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

/// The sweep space of the mark-sweep plan. Objects live in size-classed slots; an
/// allocation bitmap per chunk records which slots hold objects. Sweeping clears the bits of
/// unmarked objects. Sparse chunks of the same class can be compacted into denser ones.
pub struct SweepSpace {
    heap: Arc<HeapLayout>,
    chunks: Box<[ChunkInfo]>,
    free_chunks: SegQueue<BlockIndex>,
    available: [SegQueue<BlockIndex>; NUM_SIZE_CLASSES],
    sweep_cursor: AtomicUsize,
    sweep_cycle: AtomicUsize,
    used: AtomicUsize,
}

impl SweepSpace {
    pub fn new(heap: Arc<HeapLayout>) -> Self {
        let chunks = (0..heap.blocks.len()).map(|_| ChunkInfo::new()).collect();
        let space = SweepSpace {
            chunks,
            free_chunks: SegQueue::new(),
            available: std::array::from_fn(|_| SegQueue::new()),
            sweep_cursor: AtomicUsize::new(0),
            sweep_cycle: AtomicUsize::new(0),
            used: AtomicUsize::new(0),
            heap,
        };
        for i in space.chunk_range() {
            space.free_chunks.push(i);
        }
        space
    }

    pub fn chunk_range(&self) -> Range<BlockIndex> {
        self.heap.los_end_block()..self.heap.committed_end_block()
    }

    /// Chunks committed by heap growth become free chunks.
    pub fn add_chunks(&self, range: Range<BlockIndex>) {
        for i in range {
            self.chunks[i].state.store(ChunkState::Free, Ordering::Release);
            self.free_chunks.push(i);
        }
    }

    pub fn state(&self, chunk: BlockIndex) -> ChunkState {
        self.chunks[chunk].state.load(Ordering::Acquire)
    }

    fn cas_state(&self, chunk: BlockIndex, from: ChunkState, to: ChunkState) -> bool {
        self.chunks[chunk]
            .state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub fn size_class(&self, chunk: BlockIndex) -> usize {
        self.chunks[chunk].size_class.load(Ordering::Relaxed)
    }

    pub fn slot_size(&self, chunk: BlockIndex) -> usize {
        SIZE_CLASSES[self.size_class(chunk)]
    }

    fn num_slots(&self, chunk: BlockIndex) -> usize {
        BYTES_IN_BLOCK / self.slot_size(chunk)
    }

    pub fn slot_address(&self, chunk: BlockIndex, slot: usize) -> Address {
        self.heap.blocks.start(chunk) + slot * self.slot_size(chunk)
    }

    fn is_allocated(&self, chunk: BlockIndex, slot: usize) -> bool {
        self.chunks[chunk].alloc_bits[slot / 64].load(Ordering::Acquire) & (1 << (slot % 64)) != 0
    }

    /// Number of allocated slots of a chunk.
    pub fn live_slots(&self, chunk: BlockIndex) -> usize {
        self.chunks[chunk]
            .alloc_bits
            .iter()
            .map(|w| w.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Get a chunk of `class` with free slots for a mutator: a queued chunk of that class,
    /// or a free chunk formatted for it.
    pub fn acquire_chunk(&self, class: usize) -> Option<BlockIndex> {
        while let Some(c) = self.available[class].pop() {
            // Stale queue entries lose this race and are dropped.
            if self.size_class(c) == class
                && self.cas_state(c, ChunkState::Available, ChunkState::Owned)
            {
                return Some(c);
            }
        }
        while let Some(c) = self.free_chunks.pop() {
            if !self.chunk_range().contains(&c) {
                continue;
            }
            if self.cas_state(c, ChunkState::Free, ChunkState::Owned) {
                self.format(c, class);
                return Some(c);
            }
        }
        None
    }

    fn format(&self, chunk: BlockIndex, class: usize) {
        let info = &self.chunks[chunk];
        info.size_class.store(class, Ordering::Relaxed);
        for w in info.alloc_bits.iter() {
            w.store(0, Ordering::Relaxed);
        }
        unsafe { self.heap.blocks.start(chunk).zero(BYTES_IN_BLOCK) };
    }

    /// Find the next free slot at or after `from` in an owned chunk.
    pub fn next_free_slot(&self, chunk: BlockIndex, from: usize) -> Option<usize> {
        debug_assert_eq!(self.state(chunk), ChunkState::Owned);
        (from..self.num_slots(chunk)).find(|s| !self.is_allocated(chunk, *s))
    }

    /// Prepare a free slot for a new object: zero it. The object becomes visible to the
    /// sweeper only once [`SweepSpace::commit_slot`] sets its allocation bit, after the
    /// header has been written.
    pub fn claim_slot(&self, chunk: BlockIndex, slot: usize) -> Address {
        let addr = self.slot_address(chunk, slot);
        unsafe { addr.zero(self.slot_size(chunk)) };
        addr
    }

    pub fn commit_slot(&self, chunk: BlockIndex, slot: usize) {
        self.chunks[chunk].alloc_bits[slot / 64].fetch_or(1 << (slot % 64), Ordering::Release);
        self.used.fetch_add(self.slot_size(chunk), Ordering::Relaxed);
    }

    fn clear_slot(&self, chunk: BlockIndex, slot: usize) {
        self.chunks[chunk].alloc_bits[slot / 64].fetch_and(!(1 << (slot % 64)), Ordering::AcqRel);
        self.used.fetch_sub(self.slot_size(chunk), Ordering::Relaxed);
    }

    /// A mutator gives a chunk back.
    pub fn release_chunk(&self, chunk: BlockIndex) {
        debug_assert_eq!(self.state(chunk), ChunkState::Owned);
        self.publish(chunk);
    }

    /// Put an exclusively held chunk into the state that matches its occupancy.
    fn publish(&self, chunk: BlockIndex) {
        let live = self.live_slots(chunk);
        let info = &self.chunks[chunk];
        if live == 0 {
            info.state.store(ChunkState::Free, Ordering::Release);
            self.free_chunks.push(chunk);
        } else if live < self.num_slots(chunk) {
            info.state.store(ChunkState::Available, Ordering::Release);
            self.available[self.size_class(chunk)].push(chunk);
        } else {
            info.state.store(ChunkState::Full, Ordering::Release);
        }
    }

    /// Visit every object of a chunk.
    pub fn for_each_object_in_chunk(&self, chunk: BlockIndex, mut f: impl FnMut(ObjectReference)) {
        for (w, bits) in self.chunks[chunk].alloc_bits.iter().enumerate() {
            let mut bits = bits.load(Ordering::Acquire);
            while bits != 0 {
                let slot = w * 64 + bits.trailing_zeros() as usize;
                bits &= bits - 1;
                let addr = self.slot_address(chunk, slot);
                f(unsafe { ObjectReference::from_raw_address_unchecked(addr) });
            }
        }
    }

    /// Visit every object in the space. Must not run concurrently with allocation.
    pub fn for_each_object(&self, mut f: impl FnMut(ObjectReference)) {
        for c in self.chunk_range() {
            if self.state(c) != ChunkState::Free {
                self.for_each_object_in_chunk(c, &mut f);
            }
        }
    }

    pub fn contains_object(&self, object: ObjectReference) -> bool {
        let addr = object.to_raw_address();
        if !self.heap.in_mos(addr) {
            return false;
        }
        let c = self.heap.block_index(addr);
        if self.state(c) == ChunkState::Free {
            return false;
        }
        let offset = addr - self.heap.blocks.start(c);
        offset % self.slot_size(c) == 0 && self.is_allocated(c, offset / self.slot_size(c))
    }

    /// Start a new sweep cycle: every chunk counts as unswept again.
    pub fn prepare_sweep(&self) {
        self.sweep_cycle.fetch_add(1, Ordering::SeqCst);
        self.sweep_cursor
            .store(self.heap.los_end_block(), Ordering::SeqCst);
    }

    /// Claim chunks one at a time and sweep them until every chunk has been claimed. Chunks
    /// owned by mutators are skipped. Returns the bytes reclaimed by this caller.
    pub fn sweep_claimed(&self, parity: MarkParity) -> usize {
        let end = self.heap.committed_end_block();
        let mut reclaimed = 0;
        loop {
            let c = self.sweep_cursor.fetch_add(1, Ordering::SeqCst);
            if c >= end {
                return reclaimed;
            }
            reclaimed += self.sweep_chunk(c, parity);
        }
    }

    /// Whether every chunk has been handed to a sweeper.
    pub fn sweep_claims_done(&self) -> bool {
        self.sweep_cursor.load(Ordering::SeqCst) >= self.heap.committed_end_block()
    }

    /// Sweep one chunk: free every allocated slot whose object is not marked under `parity`.
    pub fn sweep_chunk(&self, chunk: BlockIndex, parity: MarkParity) -> usize {
        let claimed = self.cas_state(chunk, ChunkState::Full, ChunkState::Sweeping)
            || self.cas_state(chunk, ChunkState::Available, ChunkState::Sweeping);
        if !claimed {
            return 0;
        }
        self.chunks[chunk]
            .swept_cycle
            .store(self.sweep_cycle.load(Ordering::SeqCst), Ordering::Relaxed);
        let mut dead = vec![];
        let size = self.slot_size(chunk);
        self.for_each_object_in_chunk(chunk, |o| {
            if !header::is_marked(o, parity) {
                dead.push((o.to_raw_address() - self.heap.blocks.start(chunk)) / size);
            }
        });
        for slot in dead.iter() {
            self.clear_slot(chunk, *slot);
        }
        self.publish(chunk);
        dead.len() * size
    }

    /// Sweep the chunks the current cycle has not swept yet: chunks that a mutator owned while
    /// the sweeper passed them. Must run while mutators are stopped and after
    /// [`SweepSpace::release_all_owned`].
    pub fn sweep_unswept(&self, parity: MarkParity) -> usize {
        let cycle = self.sweep_cycle.load(Ordering::SeqCst);
        self.chunk_range()
            .filter(|c| self.chunks[*c].swept_cycle.load(Ordering::Relaxed) != cycle)
            .map(|c| self.sweep_chunk(c, parity))
            .sum()
    }

    /// Return every owned chunk to a sweepable state. Used while mutators are stopped.
    pub fn release_all_owned(&self) {
        for c in self.chunk_range() {
            if self.state(c) == ChunkState::Owned {
                self.publish(c);
            }
        }
    }

    /// Compact sparse `Available` chunks of each size class into denser ones. Moved objects
    /// are left forwarded. Must run while mutators are stopped and after sweeping. Returns the
    /// number of objects moved.
    pub fn compact(&self) -> usize {
        let mut moved = 0;
        for class in 0..NUM_SIZE_CLASSES {
            moved += self.compact_class(class);
        }
        moved
    }

    fn compact_class(&self, class: usize) -> usize {
        let mut candidates = vec![];
        while let Some(c) = self.available[class].pop() {
            if self.size_class(c) == class
                && self.cas_state(c, ChunkState::Available, ChunkState::Sweeping)
            {
                candidates.push(c);
            }
        }
        let slots = BYTES_IN_BLOCK / SIZE_CLASSES[class];
        let live: usize = candidates.iter().map(|c| self.live_slots(*c)).sum();
        // Only compact if the live objects fit in at most half of the candidate chunks.
        let needed = live.div_ceil(slots);
        if candidates.len() < 2 || needed * 2 > candidates.len() {
            for c in candidates {
                self.publish(c);
            }
            return 0;
        }
        // Densest first: the front are targets, the back are sources.
        candidates.sort_by_key(|c| std::cmp::Reverse(self.live_slots(*c)));
        let mut moved = 0;
        let mut target = 0;
        let mut source = candidates.len() - 1;
        let mut target_slot = 0;
        'sources: while source > target {
            let s = candidates[source];
            let mut objects = vec![];
            self.for_each_object_in_chunk(s, |o| objects.push(o));
            for o in objects {
                let free = loop {
                    if target >= source {
                        break 'sources;
                    }
                    match (target_slot..slots).find(|i| !self.is_allocated(candidates[target], *i)) {
                        Some(i) => break i,
                        None => {
                            target += 1;
                            target_slot = 0;
                        }
                    }
                };
                let t = candidates[target];
                let to = self.slot_address(t, free);
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        o.to_raw_address().to_ptr::<u8>(),
                        to.to_mut_ptr::<u8>(),
                        SIZE_CLASSES[class],
                    );
                }
                self.chunks[t].alloc_bits[free / 64].fetch_or(1 << (free % 64), Ordering::Release);
                let slot = (o.to_raw_address() - self.heap.blocks.start(s)) / SIZE_CLASSES[class];
                self.chunks[s].alloc_bits[slot / 64].fetch_and(!(1 << (slot % 64)), Ordering::AcqRel);
                header::set_forwarding(o, unsafe { ObjectReference::from_raw_address_unchecked(to) });
                target_slot = free + 1;
                moved += 1;
            }
            source -= 1;
        }
        for c in candidates {
            self.publish(c);
        }
        if moved > 0 {
            debug!("Compacted {} objects of size class {}", moved, SIZE_CLASSES[class]);
        }
        moved
    }

    pub fn num_free_chunks(&self) -> usize {
        self.chunk_range()
            .filter(|c| self.state(*c) == ChunkState::Free)
            .count()
    }
}

impl Space for SweepSpace {
    fn name(&self) -> &'static str {
        "sweep"
    }

    fn committed_bytes(&self) -> usize {
        self.heap.committed_end() - self.heap.los_end()
    }

    fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::options::{Options, PlanSelector};

    fn space() -> SweepSpace {
        let mut options = Options::without_env();
        options.plan = PlanSelector::MarkSweep;
        options.min_heap = 32 * BYTES_IN_BLOCK;
        options.max_heap = 32 * BYTES_IN_BLOCK;
        SweepSpace::new(Arc::new(HeapLayout::new(&options).unwrap()))
    }

    fn alloc(space: &SweepSpace, chunk: BlockIndex, parity: Option<MarkParity>) -> ObjectReference {
        let slot = space.next_free_slot(chunk, 0).unwrap();
        let addr = space.claim_slot(chunk, slot);
        let obj = ObjectReference::from_raw_address(addr).unwrap();
        header::initialize_header(obj, unsafe { Address::from_usize(0x1000) }, parity);
        space.commit_slot(chunk, slot);
        obj
    }

    #[test]
    fn size_classes() {
        assert_eq!(size_class_of(1), Some(0));
        assert_eq!(size_class_of(16), Some(0));
        assert_eq!(size_class_of(17), Some(1));
        assert_eq!(size_class_of(8192), Some(NUM_SIZE_CLASSES - 1));
        assert_eq!(size_class_of(8193), None);
    }

    #[test]
    fn sweep_frees_unmarked_slots() {
        let space = space();
        let c = space.acquire_chunk(2).unwrap();
        let live = alloc(&space, c, Some(MarkParity::Even));
        let dead = alloc(&space, c, None);
        assert_eq!(space.live_slots(c), 2);
        space.release_chunk(c);
        assert_eq!(space.state(c), ChunkState::Available);
        assert_eq!(space.sweep_chunk(c, MarkParity::Even), 32);
        assert!(space.contains_object(live));
        assert!(!space.contains_object(dead));
        // Owned chunks are left alone.
        let c2 = space.acquire_chunk(2).unwrap();
        assert_eq!(c2, c);
        assert_eq!(space.sweep_chunk(c2, MarkParity::Even), 0);
    }

    #[test]
    fn chunks_owned_during_the_sweep_are_swept_later() {
        let space = space();
        let c = space.acquire_chunk(3).unwrap();
        let live = alloc(&space, c, Some(MarkParity::Odd));
        let dead = alloc(&space, c, None);
        space.prepare_sweep();
        space.sweep_claimed(MarkParity::Odd);
        assert!(space.contains_object(dead));
        space.release_all_owned();
        assert_eq!(space.sweep_unswept(MarkParity::Odd), 48);
        assert!(space.contains_object(live));
        assert!(!space.contains_object(dead));
        // Everything has been swept in this cycle now.
        assert_eq!(space.sweep_unswept(MarkParity::Odd), 0);
    }

    #[test]
    fn empty_chunks_return_to_free_list() {
        let space = space();
        let free = space.num_free_chunks();
        let c = space.acquire_chunk(5).unwrap();
        alloc(&space, c, None);
        space.release_chunk(c);
        assert_eq!(space.num_free_chunks(), free - 1);
        space.prepare_sweep();
        space.sweep_claimed(MarkParity::Even);
        assert!(space.sweep_claims_done());
        assert_eq!(space.num_free_chunks(), free);
        assert_eq!(space.used_bytes(), 0);
    }

    #[test]
    fn compaction_merges_sparse_chunks() {
        let space = space();
        let mut chunks = vec![];
        let mut objects = vec![];
        for _ in 0..4 {
            let c = space.acquire_chunk(0).unwrap();
            objects.push(alloc(&space, c, Some(MarkParity::Even)));
            chunks.push(c);
        }
        for c in chunks.iter() {
            space.release_chunk(*c);
        }
        let moved = space.compact();
        assert_eq!(moved, 3);
        let forwarded = objects.iter().filter(|o| header::is_forwarded(**o)).count();
        assert_eq!(forwarded, 3);
        let live: usize = chunks.iter().map(|c| space.live_slots(*c)).sum();
        assert_eq!(live, 4);
        assert_eq!(
            chunks.iter().filter(|c| space.state(**c) == ChunkState::Free).count(),
            3
        );
    }
}
