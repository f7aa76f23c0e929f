//! A stop-the-world heap verifier.
//!
//! [`verify_heap`] walks the object graph from the roots (and from the runtime-visible
//! finalizer and reference queues) on the calling thread, independently of the collector
//! pool. It is used by tests, by the `verify_heap` option around every collection and before
//! out-of-memory is reported.

use crate::plan::ConcurrentPhase;
use crate::util::header;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, RootSetBuilder, Scanning, Slot, VMBinding};
use crate::GC;
use std::collections::HashSet;

/// Verify every object reachable from the roots. Returns the number of reachable objects, or
/// a description of the first problem found.
///
/// Checks that every reachable object lies in one of the plan's spaces, is not forwarded, does
/// not carry the fallback mark, and (between concurrent cycles) carries no mark of the
/// current parity. With `check_remsets`, every slot outside the nursery that refers into the
/// nursery must also be in a remembered set.
///
/// Mutators must be stopped, or at least must not allocate or write, while this runs.
pub(crate) fn verify_heap<VM: VMBinding>(gc: &GC<VM>, check_remsets: bool) -> Result<usize, String> {
    let base = gc.heap.start();
    let mut stack: Vec<ObjectReference> = vec![];
    let mut visited: HashSet<ObjectReference> = HashSet::new();

    for slot in enumerate_roots(gc) {
        if let Some(object) = slot.load(base) {
            check_referent(gc, object, "root", slot.address())?;
            if visited.insert(object) {
                stack.push(object);
            }
        }
    }
    let mut queue_error = None;
    gc.finref.for_each_queue_slot(|slot| {
        let Some(object) = slot.load(base) else {
            return;
        };
        if let Err(e) = check_referent(gc, object, "queue entry", slot.address()) {
            queue_error.get_or_insert(e);
        } else if visited.insert(object) {
            stack.push(object);
        }
    });
    if let Some(e) = queue_error {
        return Err(e);
    }

    let remembered = if check_remsets {
        Some(remembered_slots(gc))
    } else {
        None
    };
    let check_marks = gc.state.phase() == ConcurrentPhase::Idle;
    let parity = gc.state.mark_parity();

    while let Some(object) = stack.pop() {
        if header::is_marked_in_vtable(object) {
            return Err(format!("{} still carries the fallback mark", object));
        }
        if check_marks && header::is_marked(object, parity) {
            return Err(format!("{} carries a mark of the current parity {:?}", object, parity));
        }
        let outside_nursery = !gc.heap.in_nos(object.to_raw_address());
        let mut result = Ok(());
        VM::VMObjectModel::scan_object(object, &mut |slot: Address| {
            if result.is_err() {
                return;
            }
            let Some(target) = Slot::Full(slot).load(base) else {
                return;
            };
            if let Err(e) = check_referent(gc, target, "slot", slot) {
                result = Err(format!("{} (in {})", e, object));
                return;
            }
            if let Some(remembered) = remembered.as_ref() {
                if outside_nursery
                    && gc.heap.in_nos(target.to_raw_address())
                    && !remembered.contains(&slot)
                {
                    result = Err(format!(
                        "slot {} of {} refers to nursery object {} but is not remembered",
                        slot, object, target
                    ));
                    return;
                }
            }
            if visited.insert(target) {
                stack.push(target);
            }
        });
        result?;
    }
    trace!("Verified {} reachable objects", visited.len());
    Ok(visited.len())
}

fn check_referent<VM: VMBinding>(
    gc: &GC<VM>,
    object: ObjectReference,
    what: &str,
    slot: Address,
) -> Result<(), String> {
    if !gc.plan.is_heap_object(gc, object) {
        return Err(format!("{} {} refers to {}, which is not an object", what, slot, object));
    }
    if header::is_forwarded(object) {
        return Err(format!("{} {} refers to forwarded object {}", what, slot, object));
    }
    Ok(())
}

/// Ask the runtime for its roots without disturbing the root snapshot of a running
/// collection.
fn enumerate_roots<VM: VMBinding>(gc: &GC<VM>) -> Vec<Slot> {
    {
        let mut builder =
            RootSetBuilder::new(&gc.metadata, &gc.stats, gc.heap.start(), gc.heap.committed_end());
        VM::VMScanning::enumerate_roots(&mut builder);
    }
    let mut slots = vec![];
    for buffer in gc.metadata.gc_rootset_pool.drain() {
        slots.extend(buffer.iter().map(Slot::decode));
        gc.metadata.put_free_set_buffer(buffer);
    }
    slots
}

fn remembered_slots<VM: VMBinding>(gc: &GC<VM>) -> HashSet<Address> {
    let mut set = HashSet::new();
    for pool in [&gc.metadata.mutator_remset_pool, &gc.metadata.collector_remset_pool] {
        let buffers = pool.drain();
        for buffer in buffers.iter() {
            set.extend(buffer.iter().map(|word| Slot::decode(word).address()));
        }
        for buffer in buffers {
            pool.put(buffer);
        }
    }
    set
}
