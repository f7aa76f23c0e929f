//! The stop-the-world mark-sweep pipeline, and the marking pieces the concurrent phases
//! share with it.

use super::MarkSweep;
use crate::plan::barrier::RESCAN_TAG;
use crate::plan::tracing::{drain, scan_object, trace_from_roots};
use crate::policy::sweepspace::ChunkState;
use crate::scheduler::Collector;
use crate::util::header::{self, MarkParity};
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, Slot, VMBinding};
use crate::GC;
use std::sync::atomic::Ordering;

/// Mark, sweep and compact with the mutators stopped. Roots must already be enumerated.
/// Returns whether objects became finalizable.
pub(super) fn collect<VM: VMBinding>(plan: &'static MarkSweep<VM>, gc: &'static GC<VM>) -> bool {
    let metadata = &gc.metadata;
    let parity = gc.state.mark_parity();
    metadata.clear_set_pool(&metadata.dirty_obj_pool);
    gc.finref.push_queue_roots(metadata);

    gc.prepare_trace();
    gc.collectors.run_task("mark", move |c| {
        trace_from_roots(c, move |c, slot| mark_slot(c, slot, parity));
    });
    let found = process_finref(gc, parity);

    let mut reclaimed = gc.los.sweep(|object| header::is_marked(object, parity));
    plan.space.prepare_sweep();
    plan.reclaimed.store(0, Ordering::SeqCst);
    gc.collectors.run_task("sweep", move |_| {
        let bytes = plan.space.sweep_claimed(parity);
        plan.reclaimed.fetch_add(bytes, Ordering::Relaxed);
    });
    reclaimed += plan.reclaimed.swap(0, Ordering::SeqCst);
    reclaimed += plan.space.sweep_unswept(parity);
    debug!("Swept {} bytes", reclaimed);

    let moved = plan.space.compact();
    if moved > 0 {
        fix_moved(plan, gc);
    }
    found
}

/// Mark the referent of `slot` and scan it if this call marked it.
pub(super) fn mark_slot<VM: VMBinding>(collector: &mut Collector<VM>, slot: Slot, parity: MarkParity) {
    let base = collector.gc().heap.start();
    let Some(object) = slot.load(base) else {
        return;
    };
    if header::try_mark(object, parity) {
        trace!("Marked {}", object);
        scan_object(collector, object, false);
    }
}

/// Claim dirty object buffers until none are left. Tagged entries are marked objects written
/// to while the mark ran and are rescanned; the others are overwritten referents to mark.
pub(super) fn mark_dirty_objects<VM: VMBinding>(collector: &mut Collector<VM>, parity: MarkParity) {
    let gc = collector.gc();
    while let Some(buffer) = gc.metadata.dirty_obj_pool.get() {
        for word in buffer.iter() {
            let Some(object) = ObjectReference::from_word(word & !RESCAN_TAG) else {
                continue;
            };
            if word & RESCAN_TAG != 0 || header::try_mark(object, parity) {
                scan_object(collector, object, false);
            }
        }
        gc.metadata.put_free_set_buffer(buffer);
    }
}

/// Reference and finalizer processing after a full mark.
pub(super) fn process_finref<VM: VMBinding>(gc: &'static GC<VM>, parity: MarkParity) -> bool {
    gc.finref.process::<VM>(
        &gc.metadata,
        gc.heap.start(),
        true,
        &|object| header::is_marked(object, parity).then_some(object),
        &|| {
            gc.prepare_trace();
            gc.collectors.run_task("resurrection", move |c| {
                drain(c, move |c, slot| mark_slot(c, slot, parity));
                c.flush();
            });
        },
    )
}

/// Point every slot that refers to a compacted object at its new copy. Chunks and LOS
/// objects are striped over the collectors.
fn fix_moved<VM: VMBinding>(plan: &'static MarkSweep<VM>, gc: &'static GC<VM>) {
    gc.metadata.reset_root_cursor();
    gc.collectors.run_task("fix slots", move |c| {
        let gc = c.gc();
        let base = gc.heap.start();
        let stride = gc.collectors.num_collectors();
        gc.metadata
            .for_each_claimed_root(|word| fix_slot(base, Slot::decode(word)));
        for chunk in plan.space.chunk_range().skip(c.ordinal()).step_by(stride) {
            if plan.space.state(chunk) != ChunkState::Free {
                plan.space
                    .for_each_object_in_chunk(chunk, |object| fix_object::<VM>(base, object));
            }
        }
        for (object, _) in gc.los.objects().into_iter().skip(c.ordinal()).step_by(stride) {
            fix_object::<VM>(base, object);
        }
        if c.ordinal() == 0 {
            gc.finref.for_each_live_slot(|slot| fix_slot(base, slot));
        }
    });
}

fn fix_object<VM: VMBinding>(base: Address, object: ObjectReference) {
    VM::VMObjectModel::scan_object(object, &mut |slot: Address| fix_slot(base, Slot::Full(slot)));
}

fn fix_slot(base: Address, slot: Slot) {
    if let Some(object) = slot.load(base) {
        if let Some(to) = header::forwarding_target(object) {
            slot.store(base, Some(to));
        }
    }
}
