//! Plans: the collection state machines and the mutator side of allocation and barriers.
//!
//! A GC instance runs exactly one [`Plan`], picked by the `plan` option:
//!
//! * [`generational::GenCompact`]: NOS, MOS and LOS, with minor, major and fallback
//!   collections.
//! * [`marksweep::MarkSweep`]: a size-classed sweep space and LOS, collected by a mark-sweep
//!   pipeline that may run concurrently with the mutators.

mod barrier;
pub mod generational;
mod global;
pub mod marksweep;
mod mutator;
pub(crate) mod tracing;

pub use self::global::ConcurrentPhase;
pub use self::global::GcRuntimeState;
pub use self::mutator::{Mutator, MutatorState};
pub(crate) use self::mutator::MutatorShared;

use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;
use crate::GC;
use bytemuck::NoUninit;
use enum_map::Enum;

/// The kind of a collection.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Enum, NoUninit)]
pub enum CollectionKind {
    /// Evacuates the nursery into the mature space.
    Minor = 0,
    /// Marks the whole heap and compacts MOS and NOS.
    Major = 1,
    /// A full collection that takes over from a minor collection that ran out of space.
    Fallback = 2,
    /// A cycle of the mark-sweep plan.
    MarkSweep = 3,
}

/// Why a collection was requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GcCause {
    /// A small-object space is exhausted.
    AllocationFailure,
    /// The large object space cannot fit a request.
    LargeObjectFailure,
    /// The runtime asked for a full collection.
    Explicit,
    /// An allocation still failed after a collection. Collect everything that can be collected.
    LastResort,
}

impl GcCause {
    pub fn requires_full_heap(self) -> bool {
        !matches!(self, GcCause::AllocationFailure)
    }
}

/// Where an object should be allocated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocationSemantics {
    /// Small objects in the nursery (or the sweep space), large objects in LOS.
    Default,
    /// Directly in the mature space. The same as `Default` for the mark-sweep plan.
    Mature,
    /// In the large object space regardless of size.
    Los,
}

/// The interface between the GC instance and a collection strategy.
pub trait Plan<VM: VMBinding>: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Allocate `size` bytes (already aligned) and write the header. Returns `None` if the
    /// space is exhausted. Never collects.
    fn alloc(
        &self,
        gc: &GC<VM>,
        state: &mut MutatorState,
        size: usize,
        vtable: Address,
        semantics: AllocationSemantics,
    ) -> Option<ObjectReference>;

    /// Allocate from the mutator's current block or chunk only.
    fn alloc_fast(
        &self,
        gc: &GC<VM>,
        state: &mut MutatorState,
        size: usize,
        vtable: Address,
    ) -> Option<ObjectReference>;

    /// Give back everything the mutator holds locally. Called while the mutator is stopped
    /// or when its thread detaches.
    fn flush_mutator(&self, gc: &GC<VM>, state: &mut MutatorState);

    /// Run a collection. The caller holds the collection lock; the plan stops and resumes the
    /// mutators itself.
    fn collect(&'static self, gc: &'static GC<VM>, cause: GcCause);

    /// Called on allocation slow paths. Concurrent plans advance their phases here.
    fn poll(&'static self, _gc: &'static GC<VM>) -> bool {
        false
    }

    /// The write barrier before a reference store into `slot` of `src`.
    fn pre_write(&self, _gc: &GC<VM>, _state: &mut MutatorState, _src: ObjectReference, _slot: Address) {}

    /// The write barrier after a reference store of `target` into `slot` of `src`.
    fn post_write(
        &self,
        _gc: &GC<VM>,
        _state: &mut MutatorState,
        _src: ObjectReference,
        _slot: Address,
        _target: Option<ObjectReference>,
    ) {
    }

    /// Bytes available for allocation without a collection.
    fn free_bytes(&self, gc: &GC<VM>) -> usize;

    /// Bytes committed for objects.
    fn total_bytes(&self, gc: &GC<VM>) -> usize;

    /// Whether `object` is an object in one of the plan's spaces.
    fn is_heap_object(&self, gc: &GC<VM>, object: ObjectReference) -> bool;

    /// Log the usage of each space.
    fn print_usage(&self, gc: &GC<VM>);

    /// Downcasts used by tests and by the heap verifier.
    fn as_gen_compact(&self) -> Option<&generational::GenCompact<VM>> {
        None
    }

    fn as_mark_sweep(&self) -> Option<&marksweep::MarkSweep<VM>> {
        None
    }
}
