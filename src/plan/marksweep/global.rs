use super::concurrent::{self, CycleInfo};
use super::mark;
use crate::plan::barrier::{IncrementalUpdateBarrier, SatbBarrier};
use crate::plan::mutator::OwnedChunk;
use crate::plan::{AllocationSemantics, CollectionKind, GcCause, MutatorState, Plan};
use crate::policy::heap::HeapLayout;
use crate::policy::space::Space;
use crate::policy::sweepspace::{self, SweepSpace};
use crate::scheduler::{CollectionSample, CollectionScheduler};
use crate::util::conversions;
use crate::util::header;
use crate::util::metadata::MetadataBuffer;
use crate::util::options::{ConcurrentAlgorithm, Options};
use crate::util::{Address, ObjectReference};
use crate::vm::{Collection, VMBinding};
use crate::GC;
use std::marker::PhantomData;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

/// The mark-sweep plan.
pub struct MarkSweep<VM: VMBinding> {
    pub(super) heap: Arc<HeapLayout>,
    pub(super) space: SweepSpace,
    pub(super) scheduler: CollectionScheduler,
    pub(super) algorithm: ConcurrentAlgorithm,
    /// Root and queue referents copied at the start of a concurrent mark. The marker traces
    /// the entries of these buffers as slots.
    pub(super) root_snapshot: spin::Mutex<Vec<Box<MetadataBuffer>>>,
    /// Bookkeeping of the concurrent cycle in progress.
    pub(super) cycle: spin::Mutex<Option<CycleInfo>>,
    /// Bytes reclaimed by the sweepers of the current cycle.
    pub(super) reclaimed: AtomicUsize,
    _p: PhantomData<VM>,
}

impl<VM: VMBinding> MarkSweep<VM> {
    pub fn new(options: &Options, heap: Arc<HeapLayout>) -> Self {
        MarkSweep {
            space: SweepSpace::new(heap.clone()),
            scheduler: CollectionScheduler::new(options.concurrent),
            algorithm: options.concurrent,
            root_snapshot: spin::Mutex::new(vec![]),
            cycle: spin::Mutex::new(None),
            reclaimed: AtomicUsize::new(0),
            heap,
            _p: PhantomData,
        }
    }

    pub fn space(&self) -> &SweepSpace {
        &self.space
    }

    pub fn scheduler(&self) -> &CollectionScheduler {
        &self.scheduler
    }

    pub fn algorithm(&self) -> ConcurrentAlgorithm {
        self.algorithm
    }

    pub fn is_concurrent(&self) -> bool {
        self.algorithm != ConcurrentAlgorithm::None
    }

    pub(super) fn used_bytes(&self, gc: &GC<VM>) -> usize {
        self.space.used_bytes() + gc.los.used_bytes()
    }

    /// Grow the heap when live data fills more than 70% of the sweep space. The new blocks
    /// become free chunks.
    pub(super) fn adjust_heap_size(&self, _gc: &GC<VM>) {
        let heap = &*self.heap;
        let total = self.space.committed_bytes();
        let live = self.space.used_bytes();
        if live * 10 <= total * 7 {
            return;
        }
        let old_end = heap.committed_end_block();
        let added = heap.grow(heap.committed_bytes());
        if added == 0 {
            return;
        }
        heap.set_nos_start(heap.committed_end());
        self.space.add_chunks(old_end..heap.committed_end_block());
        info!(
            "Live data fills {}% of the sweep space, heap grown by {}",
            live * 100 / total,
            conversions::bytes_to_formatted_string(added)
        );
    }

    /// Allocate from the mutator's chunk of `class`. With `refill`, a full chunk is given back
    /// and another one acquired.
    fn alloc_small(
        &self,
        gc: &GC<VM>,
        state: &mut MutatorState,
        class: usize,
        vtable: Address,
        refill: bool,
    ) -> Option<ObjectReference> {
        let (chunk, slot) = loop {
            if let Some(owned) = state.chunks[class].as_mut() {
                if let Some(slot) = self.space.next_free_slot(owned.chunk, owned.next_slot) {
                    owned.next_slot = slot + 1;
                    break (owned.chunk, slot);
                }
                if !refill {
                    return None;
                }
                let full = owned.chunk;
                state.chunks[class] = None;
                self.space.release_chunk(full);
            }
            if !refill {
                return None;
            }
            let chunk = self.space.acquire_chunk(class)?;
            state.chunks[class] = Some(OwnedChunk { chunk, next_slot: 0 });
        };
        let addr = self.space.claim_slot(chunk, slot);
        let object = unsafe { ObjectReference::from_raw_address_unchecked(addr) };
        header::initialize_header(object, vtable, gc.state.allocation_color());
        self.space.commit_slot(chunk, slot);
        Some(object)
    }

    /// A full stop-the-world cycle.
    fn collect_stop_the_world(&'static self, gc: &'static GC<VM>, cause: GcCause) {
        let start = Instant::now();
        gc.state.set_gc_in_progress(true);
        gc.stop_mutators();
        let mutator_time = self.scheduler.mutator_time();
        let used_before = self.used_bytes(gc);
        let traced_before = gc.stats.objects_traced();
        let count = gc.stats.start_collection(CollectionKind::MarkSweep);
        gc.state.set_collection_kind(CollectionKind::MarkSweep);
        debug!("Collection #{} ({:?}) starts: stop-the-world mark-sweep", count, cause);
        gc.verify_if_enabled("before collection", false);

        gc.enumerate_roots();
        let finalizable = mark::collect(self, gc);
        gc.metadata.release_roots();
        gc.state.flip_mark_parity();
        self.adjust_heap_size(gc);
        gc.verify_if_enabled("after collection", false);

        let used_after = self.used_bytes(gc);
        let reclaimed = used_before.saturating_sub(used_after);
        gc.stats.add_bytes_reclaimed(reclaimed);
        let pause = start.elapsed();
        gc.stats.end_collection(pause);
        if self.is_concurrent() {
            let traced = gc.stats.objects_traced() - traced_before;
            let sample = CollectionSample {
                objects_traced: traced,
                trace_time: pause,
                bytes_freed: reclaimed,
                mutator_time,
            };
            self.scheduler.record_cycle(sample, self.free_bytes(gc), traced);
        }
        info!(
            "MarkSweep collection #{}: {} -> {} in {:?}",
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
}

impl<VM: VMBinding> Plan<VM> for MarkSweep<VM> {
    fn name(&self) -> &'static str {
        "MarkSweep"
    }

    fn alloc(
        &self,
        gc: &GC<VM>,
        state: &mut MutatorState,
        size: usize,
        vtable: Address,
        semantics: AllocationSemantics,
    ) -> Option<ObjectReference> {
        let class = match sweepspace::size_class_of(size) {
            Some(class)
                if semantics != AllocationSemantics::Los
                    && size < gc.options.large_object_threshold =>
            {
                class
            }
            _ => {
                let addr = gc.los.alloc(size)?;
                let object = unsafe { ObjectReference::from_raw_address_unchecked(addr) };
                header::initialize_header(object, vtable, gc.state.allocation_color());
                return Some(object);
            }
        };
        self.alloc_small(gc, state, class, vtable, true)
    }

    #[inline(always)]
    fn alloc_fast(
        &self,
        gc: &GC<VM>,
        state: &mut MutatorState,
        size: usize,
        vtable: Address,
    ) -> Option<ObjectReference> {
        if size >= gc.options.large_object_threshold {
            return None;
        }
        let class = sweepspace::size_class_of(size)?;
        self.alloc_small(gc, state, class, vtable, false)
    }

    fn flush_mutator(&self, _gc: &GC<VM>, state: &mut MutatorState) {
        for owned in state.chunks.iter_mut() {
            if let Some(owned) = owned.take() {
                self.space.release_chunk(owned.chunk);
            }
        }
    }

    fn collect(&'static self, gc: &'static GC<VM>, cause: GcCause) {
        if concurrent::complete_cycle(self, gc) && !cause.requires_full_heap() {
            return;
        }
        self.collect_stop_the_world(gc, cause);
    }

    fn poll(&'static self, gc: &'static GC<VM>) -> bool {
        self.is_concurrent() && concurrent::poll(self, gc)
    }

    fn pre_write(&self, gc: &GC<VM>, state: &mut MutatorState, _src: ObjectReference, slot: Address) {
        if self.algorithm == ConcurrentAlgorithm::Satb {
            SatbBarrier::pre_write(gc, state, slot);
        }
    }

    fn post_write(
        &self,
        gc: &GC<VM>,
        state: &mut MutatorState,
        src: ObjectReference,
        _slot: Address,
        _target: Option<ObjectReference>,
    ) {
        if self.algorithm == ConcurrentAlgorithm::MostlyConcurrent {
            IncrementalUpdateBarrier::post_write(gc, state, src);
        }
    }

    fn free_bytes(&self, gc: &GC<VM>) -> usize {
        self.space.free_bytes() + gc.los.total_free()
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
            gc.los.contains_object(object)
        } else {
            self.space.contains_object(object)
        }
    }

    fn print_usage(&self, gc: &GC<VM>) {
        self.space.print_usage();
        gc.los.print_usage();
    }

    fn as_mark_sweep(&self) -> Option<&MarkSweep<VM>> {
        Some(self)
    }
}
