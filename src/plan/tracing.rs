//! Pieces of the parallel trace shared by all collection kinds.

use crate::scheduler::Collector;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, ReferenceKind, Slot, VMBinding};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Push every non-null reference slot of `object` onto the collector's trace stack.
///
/// The referent slot of a reference object is not traced: the reference is recorded for
/// reference processing instead. Soft references are traced like ordinary objects when
/// `soft_is_strong` is set.
#[inline]
pub(crate) fn scan_object<VM: VMBinding>(
    collector: &mut Collector<VM>,
    object: ObjectReference,
    soft_is_strong: bool,
) {
    collector.objects_traced += 1;
    let referent_slot = discovered_referent_slot(collector, object, soft_is_strong);
    VM::VMObjectModel::scan_object(object, &mut |slot: Address| {
        if Some(slot) == referent_slot {
            return;
        }
        if !is_null_slot(slot) {
            collector.push_slot(Slot::Full(slot));
        }
    });
}

/// If `object` is a reference object whose referent must not be traced, record it and
/// return its referent slot.
fn discovered_referent_slot<VM: VMBinding>(
    collector: &mut Collector<VM>,
    object: ObjectReference,
    soft_is_strong: bool,
) -> Option<Address> {
    if collector.gc().options.no_reference_types {
        return None;
    }
    match VM::VMObjectModel::reference_kind(object)? {
        ReferenceKind::Soft if soft_is_strong => None,
        kind => {
            collector.record_reference(kind, object);
            Some(VM::VMObjectModel::referent_slot(object))
        }
    }
}

#[inline(always)]
fn is_null_slot(slot: Address) -> bool {
    unsafe { slot.atomic_load::<AtomicUsize>(Ordering::Relaxed) == 0 }
}

/// Trace until every collector has run out of work. `trace_slot` is called on each slot
/// popped from the local stack or taken from the shared pool.
pub(crate) fn drain<VM: VMBinding>(
    collector: &mut Collector<VM>,
    mut trace_slot: impl FnMut(&mut Collector<VM>, Slot),
) {
    let gc = collector.gc();
    loop {
        while let Some(slot) = collector.pop_slot() {
            trace_slot(collector, slot);
        }
        if gc.termination.wait_for_termination(&gc.metadata.mark_task_pool) {
            return;
        }
    }
}

/// Claim root buffers and trace their slots, then drain.
pub(crate) fn trace_from_roots<VM: VMBinding>(
    collector: &mut Collector<VM>,
    mut trace_slot: impl FnMut(&mut Collector<VM>, Slot),
) {
    let gc = collector.gc();
    gc.metadata
        .for_each_claimed_root(|word| trace_slot(collector, Slot::decode(word)));
    drain(collector, trace_slot);
    collector.flush();
}
