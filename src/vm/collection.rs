use crate::vm::VMBinding;

/// Fatal allocation failures reported to the runtime.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The heap is full and a collection could not free enough memory.
    HeapOutOfMemory,
    /// The OS refused to map memory for the heap.
    MmapOutOfMemory,
}

/// Thread management and error reporting, implemented by the runtime.
pub trait Collection<VM: VMBinding> {
    /// Stop every mutator thread other than the calling thread at a safepoint. When this
    /// returns, no other mutator may run until [`Collection::resume_mutators`] is called.
    fn stop_all_mutators();

    /// Resume the threads stopped by [`Collection::stop_all_mutators`].
    fn resume_mutators();

    /// Called when an allocation cannot be satisfied even after a collection, or when heap
    /// memory cannot be mapped. The default implementation logs and aborts the process.
    /// A runtime may throw an out-of-memory exception instead; the allocation that failed
    /// then returns `None`.
    fn out_of_memory(err: AllocationError) {
        error!("Out of memory with {:?}!", err);
        std::process::abort();
    }

    /// Called after a collection that found objects ready for finalization. The runtime can
    /// fetch them with [`crate::memory_manager::gc_get_finalizable_object`].
    fn schedule_finalization() {}
}
