//! Write barriers. A plan picks one of these in its [`super::Plan::pre_write`] and
//! [`super::Plan::post_write`] hooks.

use super::{ConcurrentPhase, MutatorState};
use crate::util::header;
use crate::util::{Address, ObjectReference};
use crate::vm::{Slot, VMBinding};
use crate::GC;

/// Entries of the dirty object pool with this bit set ask the marker to rescan the object.
/// Entries without it are objects to mark.
pub(crate) const RESCAN_TAG: usize = 0b1;

/// Remembers slots outside the nursery that are set to point into the nursery.
pub(crate) struct GenerationalBarrier;

impl GenerationalBarrier {
    #[inline(always)]
    pub fn post_write<VM: VMBinding>(
        gc: &GC<VM>,
        state: &mut MutatorState,
        slot: Address,
        target: Option<ObjectReference>,
    ) {
        let heap = &gc.heap;
        let Some(target) = target else {
            return;
        };
        if heap.in_nos(target.to_raw_address()) && !heap.in_nos(slot) && heap.in_heap(slot) {
            Self::slow(gc, state, slot);
        }
    }

    #[cold]
    fn slow<VM: VMBinding>(gc: &GC<VM>, state: &mut MutatorState, slot: Address) {
        state.record_remset(&gc.metadata, Slot::Full(slot));
    }
}

/// Snapshot-at-the-beginning: while marking, the value about to be overwritten is recorded
/// if the marker has not reached it yet.
pub(crate) struct SatbBarrier;

impl SatbBarrier {
    #[inline(always)]
    pub fn pre_write<VM: VMBinding>(gc: &GC<VM>, state: &mut MutatorState, slot: Address) {
        if gc.state.phase() != ConcurrentPhase::Marking {
            return;
        }
        if let Some(old) = Slot::Full(slot).load(gc.heap.start()) {
            if !header::is_marked(old, gc.state.mark_parity()) {
                state.record_dirty(&gc.metadata, old.to_raw_address().as_usize());
            }
        }
    }
}

/// Incremental update: while marking, a store into an object the marker has already reached
/// queues the object for a rescan in the final pause.
pub(crate) struct IncrementalUpdateBarrier;

impl IncrementalUpdateBarrier {
    #[inline(always)]
    pub fn post_write<VM: VMBinding>(gc: &GC<VM>, state: &mut MutatorState, src: ObjectReference) {
        if gc.state.phase() != ConcurrentPhase::Marking {
            return;
        }
        if header::is_marked(src, gc.state.mark_parity()) {
            state.record_dirty(&gc.metadata, src.to_raw_address().as_usize() | RESCAN_TAG);
        }
    }
}
