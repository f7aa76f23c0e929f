use super::{AllocationSemantics, GcCause};
use crate::policy::block::BlockIndex;
use crate::policy::sweepspace::NUM_SIZE_CLASSES;
use crate::util::bump::BumpPointer;
use crate::util::constants::MIN_OBJECT_SIZE;
use crate::util::conversions;
use crate::util::metadata::{GcMetadata, MetadataBuffer};
use crate::util::{Address, ObjectReference};
use crate::vm::{AllocationError, ObjectModel, Slot, VMBinding};
use crate::GC;
use atomic_refcell::AtomicRefCell;
use std::sync::Arc;

/// A chunk of the sweep space cached by a mutator.
#[derive(Copy, Clone, Debug)]
pub(crate) struct OwnedChunk {
    pub chunk: BlockIndex,
    /// Where to look for the next free slot.
    pub next_slot: usize,
}

/// The thread-local allocation and barrier state of a mutator. Only the plans look inside.
#[derive(Default)]
pub struct MutatorState {
    pub(crate) nursery: BumpPointer,
    pub(crate) mature: BumpPointer,
    pub(crate) chunks: [Option<OwnedChunk>; NUM_SIZE_CLASSES],
    /// The last sweep epoch this mutator acknowledged.
    pub(crate) sweep_epoch: usize,
    remset: Option<Box<MetadataBuffer>>,
    dirty: Option<Box<MetadataBuffer>>,
}

impl MutatorState {
    pub(crate) fn record_remset(&mut self, metadata: &GcMetadata, slot: Slot) {
        let buffer = self.remset.get_or_insert_with(|| metadata.free_set_buffer());
        if buffer.is_full() {
            let full = std::mem::replace(buffer, metadata.free_set_buffer());
            metadata.mutator_remset_pool.put(full);
        }
        buffer.push(slot.encode());
    }

    pub(crate) fn record_dirty(&mut self, metadata: &GcMetadata, word: usize) {
        let buffer = self.dirty.get_or_insert_with(|| metadata.free_set_buffer());
        if buffer.is_full() {
            let full = std::mem::replace(buffer, metadata.free_set_buffer());
            metadata.dirty_obj_pool.put(full);
        }
        buffer.push(word);
    }

    /// Publish the barrier buffers.
    pub(crate) fn flush_buffers(&mut self, metadata: &GcMetadata) {
        if let Some(b) = self.remset.take() {
            metadata.put_set_buffer_into(&metadata.mutator_remset_pool, b);
        }
        if let Some(b) = self.dirty.take() {
            metadata.put_set_buffer_into(&metadata.dirty_obj_pool, b);
        }
    }
}

/// The part of a mutator the GC instance keeps a handle to, so it can flush the mutator's
/// state while the mutator is stopped.
pub(crate) struct MutatorShared {
    pub id: usize,
    pub state: AtomicRefCell<MutatorState>,
}

impl MutatorShared {
    pub fn new(id: usize) -> Self {
        MutatorShared {
            id,
            state: AtomicRefCell::new(MutatorState::default()),
        }
    }
}

/// A mutator is the allocation and barrier context of one runtime thread. It is created by
/// [`crate::memory_manager::gc_thread_init`] and detached when dropped.
pub struct Mutator<VM: VMBinding> {
    gc: &'static GC<VM>,
    shared: Arc<MutatorShared>,
}

impl<VM: VMBinding> Mutator<VM> {
    pub(crate) fn new(gc: &'static GC<VM>) -> Self {
        let shared = gc.register_mutator();
        Mutator { gc, shared }
    }

    pub fn id(&self) -> usize {
        self.shared.id
    }

    /// Allocate an object of `size` bytes whose vtable word is `vtable`. The memory after the
    /// header is zeroed. On exhaustion this collects and retries; if the heap is still
    /// exhausted after a full collection, out-of-memory is reported to the runtime and `None`
    /// is returned.
    pub fn alloc(
        &mut self,
        size: usize,
        vtable: Address,
        semantics: AllocationSemantics,
    ) -> Option<ObjectReference> {
        let gc = self.gc;
        let size = conversions::object_size_align(size.max(MIN_OBJECT_SIZE));
        let large = semantics == AllocationSemantics::Los || size >= gc.options.large_object_threshold;
        gc.try_schedule_collection();
        let mut cause = if large {
            GcCause::LargeObjectFailure
        } else {
            GcCause::AllocationFailure
        };
        for attempt in 0..3 {
            let seen = gc.stats.collections();
            let result = {
                let mut state = self.shared.state.borrow_mut();
                self.acknowledge_sweep(&mut state);
                gc.plan.alloc(gc, &mut state, size, vtable, semantics)
            };
            if let Some(object) = result {
                self.post_alloc(object);
                return Some(object);
            }
            if attempt == 2 {
                break;
            }
            trace!("Allocation of {} bytes failed: {:?}", size, cause);
            gc.collect_for_allocation(cause, seen);
            cause = GcCause::LastResort;
        }
        gc.out_of_memory(AllocationError::HeapOutOfMemory);
        None
    }

    /// Allocate from the mutator's current block or chunk only. Returns `None` instead of
    /// collecting; the caller then goes to [`Mutator::alloc`].
    #[inline(always)]
    pub fn alloc_fast(&mut self, size: usize, vtable: Address) -> Option<ObjectReference> {
        let gc = self.gc;
        let size = conversions::object_size_align(size.max(MIN_OBJECT_SIZE));
        if size >= gc.options.large_object_threshold {
            return None;
        }
        let result = {
            let mut state = self.shared.state.borrow_mut();
            if state.sweep_epoch != gc.state.sweep_epoch() {
                return None;
            }
            gc.plan.alloc_fast(gc, &mut state, size, vtable)
        };
        if let Some(object) = result {
            self.post_alloc(object);
        }
        result
    }

    fn post_alloc(&self, object: ObjectReference) {
        let gc = self.gc;
        if !gc.options.no_finalizer && VM::VMObjectModel::has_finalizer(object) {
            gc.finref.register_finalizable(&gc.metadata, object);
        }
    }

    /// Give back the chunks cached before a concurrent sweep started.
    fn acknowledge_sweep(&self, state: &mut MutatorState) {
        let epoch = self.gc.state.sweep_epoch();
        if state.sweep_epoch != epoch {
            self.gc.plan.flush_mutator(self.gc, state);
            state.sweep_epoch = epoch;
        }
    }

    /// The barrier around a reference store: `target` is written into `slot` of `src`.
    pub fn write_ref(&mut self, src: ObjectReference, slot: Address, target: Option<ObjectReference>) {
        let gc = self.gc;
        let mut state = self.shared.state.borrow_mut();
        gc.plan.pre_write(gc, &mut state, src, slot);
        Slot::Full(slot).store(gc.heap.start(), target);
        gc.plan.post_write(gc, &mut state, src, slot, target);
    }

    /// The barrier before a bulk update of `src`, e.g. an array copy into it.
    pub fn pre_write_object(&mut self, src: ObjectReference) {
        let gc = self.gc;
        let mut state = self.shared.state.borrow_mut();
        VM::VMObjectModel::scan_object(src, &mut |slot: Address| {
            gc.plan.pre_write(gc, &mut state, src, slot);
        });
    }

    /// The barrier after a bulk update of `src`.
    pub fn wrote_object(&mut self, src: ObjectReference) {
        let gc = self.gc;
        let base = gc.heap.start();
        let mut state = self.shared.state.borrow_mut();
        VM::VMObjectModel::scan_object(src, &mut |slot: Address| {
            let target = Slot::Full(slot).load(base);
            gc.plan.post_write(gc, &mut state, src, slot, target);
        });
    }

    /// Publish everything this mutator holds locally.
    pub fn flush(&mut self) {
        let gc = self.gc;
        let mut state = self.shared.state.borrow_mut();
        gc.plan.flush_mutator(gc, &mut state);
        state.flush_buffers(&gc.metadata);
    }
}

impl<VM: VMBinding> Drop for Mutator<VM> {
    fn drop(&mut self) {
        self.flush();
        self.gc.unregister_mutator(self.shared.id);
    }
}
