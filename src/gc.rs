use crate::plan::generational::GenCompact;
use crate::plan::marksweep::MarkSweep;
use crate::plan::{GcCause, GcRuntimeState, MutatorShared, Plan};
use crate::policy::heap::HeapLayout;
use crate::policy::largeobjectspace::LargeObjectSpace;
use crate::scheduler::{CollectorPool, TerminationBarrier};
use crate::util::finref::FinrefMetadata;
use crate::util::metadata::GcMetadata;
use crate::util::options::{Options, PlanSelector};
use crate::util::statistics::GcStats;
use crate::vm::{AllocationError, Collection, RootSetBuilder, Scanning, VMBinding};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

/// Builds a [`GC`] instance. Options are read from `GENGC_` environment variables when the
/// builder is created and can be changed with [`GCBuilder::set_option`] before
/// [`crate::memory_manager::gc_init`] is called.
pub struct GCBuilder {
    pub options: Options,
}

impl Default for GCBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GCBuilder {
    pub fn new() -> Self {
        GCBuilder {
            options: Options::default(),
        }
    }

    /// A builder that ignores environment variables.
    pub fn new_no_env_vars() -> Self {
        GCBuilder {
            options: Options::without_env(),
        }
    }

    /// Set an option by name. Returns false if the name is unknown or the value is invalid.
    pub fn set_option(&mut self, name: &str, value: &str) -> bool {
        self.options.set_from_str(name, value)
    }

    pub(crate) fn build<VM: VMBinding>(&self) -> Result<GC<VM>, AllocationError> {
        let mut options = self.options.clone();
        if let Err(e) = options.validate() {
            error!("Invalid options: {}", e);
            return Err(AllocationError::MmapOutOfMemory);
        }
        GC::new(options)
    }
}

/// A GC instance. It owns the heap, every space, the metadata pools, the collector threads and
/// the runtime state of the collector. A runtime creates one with
/// [`crate::memory_manager::gc_init`], which gives it a `'static` lifetime.
pub struct GC<VM: VMBinding> {
    pub(crate) options: Arc<Options>,
    pub(crate) heap: Arc<HeapLayout>,
    pub(crate) metadata: GcMetadata,
    pub(crate) los: LargeObjectSpace,
    pub(crate) plan: Box<dyn Plan<VM>>,
    pub(crate) state: GcRuntimeState,
    pub(crate) stats: GcStats,
    pub(crate) finref: FinrefMetadata,
    pub(crate) collectors: CollectorPool<VM>,
    pub(crate) termination: TerminationBarrier,
    /// Cleared by a collector that cannot finish its part of a collection.
    pub(crate) collect_result: AtomicBool,
    collection_lock: Mutex<()>,
    mutators: spin::Mutex<Vec<Arc<MutatorShared>>>,
    next_mutator_id: AtomicUsize,
}

impl<VM: VMBinding> GC<VM> {
    fn new(options: Options) -> Result<Self, AllocationError> {
        let options = Arc::new(options);
        let heap = Arc::new(HeapLayout::new(&options)?);
        let plan: Box<dyn Plan<VM>> = match options.plan {
            PlanSelector::GenCompact => Box::new(GenCompact::new(&options, heap.clone())),
            PlanSelector::MarkSweep => Box::new(MarkSweep::new(&options, heap.clone())),
        };
        Ok(GC {
            metadata: GcMetadata::new(options.metadata_buffers),
            los: LargeObjectSpace::new(heap.clone()),
            plan,
            state: GcRuntimeState::new(),
            stats: GcStats::new(),
            finref: FinrefMetadata::new(),
            collectors: CollectorPool::new(options.threads),
            termination: TerminationBarrier::new(options.threads),
            collect_result: AtomicBool::new(true),
            collection_lock: Mutex::new(()),
            mutators: spin::Mutex::new(vec![]),
            next_mutator_id: AtomicUsize::new(0),
            heap,
            options,
        })
    }

    /// Start the collector threads.
    pub(crate) fn initialize_collection(&'static self) {
        self.collectors.spawn(self);
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn heap(&self) -> &HeapLayout {
        &self.heap
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn runtime_state(&self) -> &GcRuntimeState {
        &self.state
    }

    pub fn metadata(&self) -> &GcMetadata {
        &self.metadata
    }

    pub fn los(&self) -> &LargeObjectSpace {
        &self.los
    }

    pub fn plan(&self) -> &dyn Plan<VM> {
        &*self.plan
    }

    pub(crate) fn register_mutator(&self) -> Arc<MutatorShared> {
        let id = self.next_mutator_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(MutatorShared::new(id));
        shared.state.borrow_mut().sweep_epoch = self.state.sweep_epoch();
        self.mutators.lock().push(shared.clone());
        shared
    }

    pub(crate) fn unregister_mutator(&self, id: usize) {
        self.mutators.lock().retain(|m| m.id != id);
    }

    pub fn num_mutators(&self) -> usize {
        self.mutators.lock().len()
    }

    /// Stop the world and take back everything the mutators hold locally.
    pub(crate) fn stop_mutators(&self) {
        VM::VMCollection::stop_all_mutators();
        self.flush_mutators();
    }

    pub(crate) fn flush_mutators(&self) {
        for m in self.mutators.lock().iter() {
            let mut state = m.state.borrow_mut();
            self.plan.flush_mutator(self, &mut state);
            state.flush_buffers(&self.metadata);
        }
    }

    pub(crate) fn resume_mutators(&self) {
        VM::VMCollection::resume_mutators();
    }

    /// Ask the runtime for the roots of this collection and make them claimable.
    pub(crate) fn enumerate_roots(&self) {
        debug_assert!(
            self.metadata.check_results_empty(),
            "result pools are not empty at the start of a collection"
        );
        {
            let mut builder = RootSetBuilder::new(
                &self.metadata,
                &self.stats,
                self.heap.start(),
                self.heap.committed_end(),
            );
            VM::VMScanning::enumerate_roots(&mut builder);
            trace!("Enumerated {} roots", builder.len());
        }
        self.metadata.snapshot_roots();
    }

    /// Prepare the shared state of a parallel trace.
    pub(crate) fn prepare_trace(&self) {
        self.termination.reset(self.collectors.num_collectors());
    }

    /// Collect because an allocation failed. `seen` is the collection count the caller saw
    /// before its allocation attempt; if another thread collected in the meantime, the caller
    /// just retries.
    pub(crate) fn collect_for_allocation(&'static self, cause: GcCause, seen: usize) {
        let _guard = self.collection_lock.lock().unwrap();
        if self.stats.collections() != seen && cause != GcCause::LastResort {
            return;
        }
        self.plan.collect(self, cause);
    }

    /// Run a full collection now.
    pub(crate) fn collect_full(&'static self, cause: GcCause) {
        let _guard = self.collection_lock.lock().unwrap();
        self.plan.collect(self, cause);
    }

    /// Let a concurrent plan advance its phases. Does nothing if another thread is collecting.
    pub(crate) fn try_schedule_collection(&'static self) -> bool {
        match self.collection_lock.try_lock() {
            Ok(_guard) => self.plan.poll(self),
            Err(TryLockError::WouldBlock) => false,
            Err(TryLockError::Poisoned(e)) => panic!("collection lock poisoned: {}", e),
        }
    }

    /// Report a fatal allocation failure to the runtime.
    pub(crate) fn out_of_memory(&self, err: AllocationError) {
        if self.options.verify_heap {
            match crate::util::sanity::verify_heap(self, false) {
                Ok(n) => info!("Heap verified before out-of-memory: {} objects reachable", n),
                Err(e) => error!("Heap verification failed before out-of-memory: {}", e),
            }
        }
        self.plan.print_usage(self);
        VM::VMCollection::out_of_memory(err);
    }

    /// Verify the heap if the `verify_heap` option (or the `extreme_assertions` feature) asks
    /// for it. Called with mutators stopped.
    pub(crate) fn verify_if_enabled(&self, when: &str, check_remsets: bool) {
        if !(self.options.verify_heap || cfg!(feature = "extreme_assertions")) {
            return;
        }
        match crate::util::sanity::verify_heap(self, check_remsets) {
            Ok(n) => debug!("Heap verified {}: {} objects reachable", when, n),
            Err(e) => panic!("Heap verification failed {}: {}", when, e),
        }
    }

    pub fn free_bytes(&self) -> usize {
        self.plan.free_bytes(self)
    }

    pub fn total_bytes(&self) -> usize {
        self.plan.total_bytes(self)
    }

    /// Stop the collector threads and give every buffer back. The instance must not be used
    /// afterwards.
    pub(crate) fn wrapup(&self) {
        self.collectors.shutdown();
        self.stats.print_stats();
        self.finref.release(&self.metadata);
        self.metadata.clear_set_pool(&self.metadata.mutator_remset_pool);
        self.metadata.clear_set_pool(&self.metadata.collector_remset_pool);
        self.metadata.clear_set_pool(&self.metadata.dirty_obj_pool);
    }
}
