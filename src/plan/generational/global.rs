use super::compact::{self, CompactCursors};
use super::fallback;
use super::minor;
use super::space_tuner::SpaceTuner;
use crate::plan::barrier::GenerationalBarrier;
use crate::plan::{AllocationSemantics, CollectionKind, GcCause, MutatorState, Plan};
use crate::policy::block::{BlockIndex, BlockStatus};
use crate::policy::heap::HeapLayout;
use crate::policy::mature::MatureSpace;
use crate::policy::nursery::NurserySpace;
use crate::policy::space::{self, Space};
use crate::util::bump::BumpPointer;
use crate::util::conversions;
use crate::util::header;
use crate::util::options::{MajorAlgorithm, Options};
use crate::util::{Address, ObjectReference};
use crate::vm::{Collection, VMBinding};
use crate::GC;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// The generational mark-compact plan.
pub struct GenCompact<VM: VMBinding> {
    pub(super) heap: Arc<HeapLayout>,
    pub(super) nursery: NurserySpace,
    pub(super) mature: MatureSpace,
    pub(super) tuner: SpaceTuner,
    pub(super) cursors: CompactCursors,
    /// Whether minor collections trace only the nursery, using remembered sets.
    pub(super) generational: bool,
    pub(super) major_algorithm: MajorAlgorithm,
    force_major_every: usize,
    max_nursery_blocks: usize,
    _p: PhantomData<VM>,
}

impl<VM: VMBinding> GenCompact<VM> {
    pub fn new(options: &Options, heap: Arc<HeapLayout>) -> Self {
        GenCompact {
            nursery: NurserySpace::new(heap.clone(), options.nos_partial_forward),
            mature: MatureSpace::new(heap.clone()),
            tuner: SpaceTuner::new(options.enable_space_tuner),
            cursors: CompactCursors::default(),
            generational: options.generational,
            major_algorithm: options.major_algorithm,
            force_major_every: options.force_major_every,
            max_nursery_blocks: conversions::bytes_to_blocks(options.nursery_size).max(1),
            heap,
            _p: PhantomData,
        }
    }

    pub fn nursery(&self) -> &NurserySpace {
        &self.nursery
    }

    pub fn mature(&self) -> &MatureSpace {
        &self.mature
    }

    pub fn is_generational(&self) -> bool {
        self.generational
    }

    fn used_bytes(&self, gc: &GC<VM>) -> usize {
        self.nursery.used_bytes() + self.mature.used_bytes() + gc.los.used_bytes()
    }

    /// Clear the marks a non-generational minor collection left on MOS and LOS objects.
    pub(super) fn clear_marks_outside_nursery(&self, gc: &GC<VM>) {
        for i in self.mature.blocks() {
            if self.heap.blocks.status(i) == BlockStatus::Used {
                self.heap
                    .blocks
                    .for_each_object::<VM>(i, |object, _| header::clear_marks(object));
            }
        }
        for (object, _) in gc.los.objects() {
            header::clear_marks(object);
        }
    }

    /// Resize the heap and the generations after a full-heap collection.
    fn finish_full_heap(&self, gc: &GC<VM>) {
        let heap = &*self.heap;
        let area = heap.committed_end() - heap.los_end();
        let live = space::used_block_bytes(heap, heap.los_end_block()..heap.committed_end_block());
        if live * 10 > area * 7 {
            let added = heap.grow(heap.committed_bytes());
            if added > 0 {
                info!(
                    "Live data fills {}% of MOS and NOS, heap grown by {}",
                    live * 100 / area,
                    conversions::bytes_to_formatted_string(added)
                );
            }
        }

        let end = heap.committed_end_block();
        let live_end: BlockIndex = (heap.los_end_block()..end)
            .rev()
            .find(|i| heap.blocks.status(*i) != BlockStatus::Free)
            .map_or(heap.los_end_block(), |i| i + 1);
        let free = end - live_end;
        let nos_blocks = (free / 2).clamp(1, self.max_nursery_blocks).min(free);
        heap.set_nos_start(heap.blocks.start(end - nos_blocks));
        debug!(
            "Generations resized: MOS {} blocks, NOS {} blocks",
            self.mature.num_blocks(),
            nos_blocks
        );

        self.nursery.release_all_blocks();
        self.mature.reset_cursor();
        gc.los.reset_allocation_stats();
        self.tuner.reset(gc);
        gc.state.set_next_gc_full(false);
    }

    fn kind_of(&self, gc: &GC<VM>, cause: GcCause) -> CollectionKind {
        let next = gc.stats.collections() + 1;
        let forced = self.force_major_every > 0 && next % self.force_major_every == 0;
        if cause.requires_full_heap() || gc.state.next_gc_full() || forced {
            CollectionKind::Major
        } else {
            CollectionKind::Minor
        }
    }
}

fn bump_alloc(
    heap: &HeapLayout,
    bump: &mut BumpPointer,
    size: usize,
    acquire: impl FnOnce() -> Option<BlockIndex>,
) -> Option<Address> {
    if let Some(addr) = bump.alloc(size) {
        return Some(addr);
    }
    let block = acquire()?;
    bump.rebind(heap, block);
    bump.alloc(size)
}

impl<VM: VMBinding> Plan<VM> for GenCompact<VM> {
    fn name(&self) -> &'static str {
        "GenCompact"
    }

    fn alloc(
        &self,
        gc: &GC<VM>,
        state: &mut MutatorState,
        size: usize,
        vtable: Address,
        semantics: AllocationSemantics,
    ) -> Option<ObjectReference> {
        let addr = if semantics == AllocationSemantics::Los || size >= gc.options.large_object_threshold {
            gc.los.alloc(size)?
        } else if semantics == AllocationSemantics::Mature {
            bump_alloc(&self.heap, &mut state.mature, size, || self.mature.alloc_block())?
        } else {
            bump_alloc(&self.heap, &mut state.nursery, size, || self.nursery.alloc_block())?
        };
        let object = unsafe { ObjectReference::from_raw_address_unchecked(addr) };
        header::initialize_header(object, vtable, None);
        Some(object)
    }

    #[inline(always)]
    fn alloc_fast(
        &self,
        _gc: &GC<VM>,
        state: &mut MutatorState,
        size: usize,
        vtable: Address,
    ) -> Option<ObjectReference> {
        let addr = state.nursery.alloc(size)?;
        let object = unsafe { ObjectReference::from_raw_address_unchecked(addr) };
        header::initialize_header(object, vtable, None);
        Some(object)
    }

    fn flush_mutator(&self, _gc: &GC<VM>, state: &mut MutatorState) {
        state.nursery.retire(&self.heap);
        state.mature.retire(&self.heap);
    }

    fn collect(&'static self, gc: &'static GC<VM>, cause: GcCause) {
        let start = Instant::now();
        gc.state.set_gc_in_progress(true);
        gc.stop_mutators();
        let used_before = self.used_bytes(gc);
        let kind = self.kind_of(gc, cause);
        let count = gc.stats.start_collection(kind);
        gc.state.set_collection_kind(kind);
        debug!("Collection #{} ({:?}) starts: {:?}", count, cause, kind);
        gc.verify_if_enabled("before collection", kind == CollectionKind::Minor && self.generational);

        gc.enumerate_roots();
        let finalizable = match kind {
            CollectionKind::Minor => match minor::collect(self, gc) {
                Some(found) => found,
                None => {
                    gc.stats.count_kind(CollectionKind::Fallback);
                    gc.state.set_collection_kind(CollectionKind::Fallback);
                    let found = fallback::collect(self, gc);
                    self.finish_full_heap(gc);
                    found
                }
            },
            _ => {
                let found = compact::major(self, gc);
                self.finish_full_heap(gc);
                found
            }
        };
        gc.metadata.release_roots();
        gc.state.flip_mark_parity();
        let done = gc.state.collection_kind();
        gc.verify_if_enabled("after collection", done == CollectionKind::Minor && self.generational);

        let used_after = self.used_bytes(gc);
        gc.stats.add_bytes_reclaimed(used_before.saturating_sub(used_after));
        let pause = start.elapsed();
        gc.stats.end_collection(pause);
        info!(
            "{:?} collection #{}: {} -> {} in {:?}",
            done,
            count,
            conversions::bytes_to_formatted_string(used_before),
            conversions::bytes_to_formatted_string(used_after),
            pause
        );
        gc.state.set_gc_in_progress(false);
        gc.resume_mutators();
        if finalizable {
            VM::VMCollection::schedule_finalization();
        }
    }

    fn post_write(
        &self,
        gc: &GC<VM>,
        state: &mut MutatorState,
        _src: ObjectReference,
        slot: Address,
        target: Option<ObjectReference>,
    ) {
        if self.generational {
            GenerationalBarrier::post_write(gc, state, slot, target);
        }
    }

    fn free_bytes(&self, gc: &GC<VM>) -> usize {
        conversions::blocks_to_bytes(self.nursery.free_blocks() + self.mature.free_blocks())
            + gc.los.total_free()
    }

    fn total_bytes(&self, _gc: &GC<VM>) -> usize {
        self.heap.committed_bytes()
    }

    fn is_heap_object(&self, gc: &GC<VM>, object: ObjectReference) -> bool {
        let addr = object.to_raw_address();
        if !conversions::is_address_aligned(addr) || !self.heap.in_heap(addr) {
            return false;
        }
        if self.heap.in_los(addr) {
            return gc.los.contains_object(object);
        }
        let block = self.heap.block_index(addr);
        match self.heap.blocks.status(block) {
            BlockStatus::Free | BlockStatus::Dest => false,
            BlockStatus::InUse => true,
            _ => addr < self.heap.blocks.free(block),
        }
    }

    fn print_usage(&self, gc: &GC<VM>) {
        self.nursery.print_usage();
        self.mature.print_usage();
        gc.los.print_usage();
    }

    fn as_gen_compact(&self) -> Option<&GenCompact<VM>> {
        Some(self)
    }
}
