//! Runtime-to-gengc interface.
//!
//! This module is the API a language runtime calls. A runtime first creates a [`GCBuilder`],
//! optionally sets options on it, and calls [`gc_init`], which returns a GC instance with a
//! `'static` lifetime. Each runtime thread that allocates then registers itself with
//! [`gc_thread_init`] and keeps the returned [`Mutator`] in thread-local storage.
//!
//! The functions here are thin and safe. A runtime that calls them through FFI is responsible
//! for turning raw pointers into the references these functions take.

use crate::build_info;
use crate::plan::{AllocationSemantics, GcCause, Mutator};
use crate::util::{Address, ObjectReference};
use crate::vm::{Collection, RootSetBuilder, VMBinding};
use crate::{GCBuilder, GC};
use std::time::Duration;

/// Initialize a GC instance: reserve and commit the heap, build the plan, and start the
/// collector threads.
///
/// This tries to install the built-in logger (if the `builtin_env_logger` feature is on). A
/// runtime that wants its own logger should install it before calling this function.
///
/// If the heap cannot be mapped, [`Collection::out_of_memory`] is called with
/// [`crate::vm::AllocationError::MmapOutOfMemory`]. The instance is leaked: it lives until the
/// process exits, or until [`gc_wrapup`] retires it.
pub fn gc_init<VM: VMBinding>(builder: &GCBuilder) -> &'static GC<VM> {
    match crate::util::logger::try_init() {
        Ok(_) => debug!("gengc initialized the logger."),
        Err(_) => debug!("gengc failed to initialize the logger. Possibly a logger has been initialized by user."),
    }
    info!("{}", *build_info::GENGC_FULL_BUILD_INFO);
    #[cfg(feature = "extreme_assertions")]
    warn!("The feature 'extreme_assertions' is enabled. gengc will verify the heap around every collection. Slow performance should be expected.");
    let gc = match builder.build::<VM>() {
        Ok(gc) => gc,
        Err(e) => {
            VM::VMCollection::out_of_memory(e);
            panic!("Failed to initialize the heap: {:?}", e);
        }
    };
    let gc: &'static GC<VM> = Box::leak(Box::new(gc));
    gc.initialize_collection();
    info!(
        "Initialized gengc with {} ({} collectors, heap {} of {})",
        gc.plan.name(),
        gc.collectors.num_collectors(),
        crate::util::conversions::bytes_to_formatted_string(gc.heap.committed_bytes()),
        crate::util::conversions::bytes_to_formatted_string(gc_max_memory(gc)),
    );
    gc
}

/// Register the calling thread as a mutator. The runtime should keep the returned mutator in
/// thread-local storage and pass it to the allocation and barrier functions.
pub fn gc_thread_init<VM: VMBinding>(gc: &'static GC<VM>) -> Box<Mutator<VM>> {
    Box::new(Mutator::new(gc))
}

/// Detach a mutator. Its cached blocks and chunks and its barrier buffers are handed back.
pub fn gc_thread_kill<VM: VMBinding>(mutator: Box<Mutator<VM>>) {
    drop(mutator);
}

/// Allocate an object of `size` bytes with the type handle `vtable`. The memory after the two
/// header words is zeroed.
///
/// This may collect. If the heap is still exhausted after a full collection,
/// [`Collection::out_of_memory`] is called and `None` is returned.
pub fn gc_alloc<VM: VMBinding>(
    mutator: &mut Mutator<VM>,
    size: usize,
    vtable: Address,
    semantics: AllocationSemantics,
) -> Option<ObjectReference> {
    mutator.alloc(size, vtable, semantics)
}

/// Allocate from the mutator's current block or chunk without taking any lock or collecting.
/// Returns `None` if that is not possible; the runtime then calls [`gc_alloc`].
#[inline(always)]
pub fn gc_alloc_fast<VM: VMBinding>(
    mutator: &mut Mutator<VM>,
    size: usize,
    vtable: Address,
) -> Option<ObjectReference> {
    mutator.alloc_fast(size, vtable)
}

/// Report a root slot holding a full-width reference. With `pinned`, the runtime asks for the
/// referent not to move; this is recorded but not honored.
pub fn gc_add_root_set_entry(roots: &mut RootSetBuilder, slot: Address, pinned: bool) {
    if pinned {
        roots.add_pinned_root(slot);
    } else {
        roots.add_root(slot);
    }
}

/// Report a root slot holding a compressed 32-bit reference.
pub fn gc_add_compressed_root_set_entry(roots: &mut RootSetBuilder, slot: Address) {
    roots.add_compressed_root(slot);
}

/// Store `target` into the reference slot `slot` of `src`, with the write barrier.
pub fn gc_heap_slot_write_ref<VM: VMBinding>(
    mutator: &mut Mutator<VM>,
    src: ObjectReference,
    slot: Address,
    target: Option<ObjectReference>,
) {
    mutator.write_ref(src, slot, target);
}

/// The barrier after the runtime has written many reference slots of `src` itself, for
/// example in an array copy.
pub fn gc_heap_wrote_object<VM: VMBinding>(mutator: &mut Mutator<VM>, src: ObjectReference) {
    mutator.wrote_object(src);
}

/// The barrier before the runtime writes many reference slots of `src` itself.
pub fn gc_heap_pre_write_object<VM: VMBinding>(mutator: &mut Mutator<VM>, src: ObjectReference) {
    mutator.pre_write_object(src);
}

/// Run a full collection now. Does nothing if the `ignore_system_gc` option is set.
///
/// The calling thread must not hold a borrowed mutator state; mutators of the calling thread
/// are flushed by the collection itself.
pub fn gc_force_gc<VM: VMBinding>(gc: &'static GC<VM>) {
    if gc.options.ignore_system_gc {
        debug!("Explicit collection ignored");
        return;
    }
    gc.collect_full(GcCause::Explicit);
}

/// Give a concurrent plan the chance to start or advance a cycle. Returns true if a phase
/// changed. Cheap to call when nothing is due.
pub fn gc_try_schedule_collection<VM: VMBinding>(gc: &'static GC<VM>) -> bool {
    gc.try_schedule_collection()
}

/// The identity hash of `object`. The first call attaches the hash to the header; objects
/// keep it when they move.
pub fn gc_get_hashcode(object: ObjectReference) -> u32 {
    crate::util::header::identity_hash(object)
}

/// Bytes available for allocation without a collection.
pub fn gc_free_memory<VM: VMBinding>(gc: &GC<VM>) -> usize {
    gc.free_bytes()
}

/// Bytes of the heap that are committed.
pub fn gc_total_memory<VM: VMBinding>(gc: &GC<VM>) -> usize {
    gc.total_bytes()
}

/// Bytes the heap can grow to.
pub fn gc_max_memory<VM: VMBinding>(gc: &GC<VM>) -> usize {
    gc.heap.reserved_end() - gc.heap.start()
}

/// Number of collections so far. A concurrent cycle counts once.
pub fn gc_get_collection_count<VM: VMBinding>(gc: &GC<VM>) -> usize {
    gc.stats.collections()
}

/// Total time the mutators were stopped for collections.
pub fn gc_get_collection_time<VM: VMBinding>(gc: &GC<VM>) -> Duration {
    gc.stats.total_pause()
}

/// The lowest address of the heap.
pub fn gc_heap_base<VM: VMBinding>(gc: &GC<VM>) -> Address {
    gc.heap.start()
}

/// The end of the reserved heap range.
pub fn gc_heap_ceiling<VM: VMBinding>(gc: &GC<VM>) -> Address {
    gc.heap.reserved_end()
}

/// Whether `object` is the start of an object in one of the heap's spaces.
pub fn gc_is_heap_object<VM: VMBinding>(gc: &GC<VM>, object: ObjectReference) -> bool {
    gc.plan.is_heap_object(gc, object)
}

/// Take the next object whose finalizer should run. The object stays reachable from the
/// queue until it is taken.
pub fn gc_get_finalizable_object<VM: VMBinding>(gc: &GC<VM>) -> Option<ObjectReference> {
    gc.finref.pop_finalizable(&gc.metadata)
}

/// Take the next reference object whose referent was cleared.
pub fn gc_get_enqueued_reference<VM: VMBinding>(gc: &GC<VM>) -> Option<ObjectReference> {
    gc.finref.pop_enqueued(&gc.metadata)
}

/// Move every object registered for finalization to the finalizable queue, for a runtime
/// that runs all finalizers at exit. Returns the number of objects moved.
pub fn gc_finalize_on_exit<VM: VMBinding>(gc: &GC<VM>) -> usize {
    if gc.options.no_finalizer {
        return 0;
    }
    gc.finref.finalize_all(&gc.metadata)
}

/// Stop the collector threads and release the metadata. Every mutator must have been killed.
pub fn gc_wrapup<VM: VMBinding>(gc: &GC<VM>) {
    if gc.num_mutators() > 0 {
        warn!("{} mutators are still attached at wrap-up", gc.num_mutators());
    }
    gc.wrapup();
}
