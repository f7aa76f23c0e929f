//! The fallback collection that finishes a failed minor collection.
//!
//! After a failed promotion some nursery objects are forwarded and some are not, and the
//! object-info words of the forwarded ones hold forwarding pointers. The fallback trace
//! therefore marks in the vtable word instead, redirecting every slot that still refers to a
//! forwarded object, and then slides the whole heap.

use super::compact::{self, Liveness};
use super::GenCompact;
use crate::plan::tracing::{drain, scan_object, trace_from_roots};
use crate::scheduler::Collector;
use crate::util::header;
use crate::util::ObjectReference;
use crate::vm::{Slot, VMBinding};
use crate::GC;

/// Returns whether objects became finalizable.
pub(super) fn collect<VM: VMBinding>(plan: &'static GenCompact<VM>, gc: &'static GC<VM>) -> bool {
    info!("Minor collection failed, falling back to a full-heap collection");
    let metadata = &gc.metadata;
    metadata.clear_set_pool(&metadata.mutator_remset_pool);
    metadata.clear_set_pool(&metadata.collector_remset_pool);
    metadata.clear_task_pool(&metadata.mark_task_pool);
    gc.finref.discard_references(metadata);
    gc.collectors.run_task("discard minor work", |c| c.discard_local_work());

    metadata.reset_root_cursor();
    gc.finref.push_queue_roots(metadata);
    gc.prepare_trace();
    gc.collectors
        .run_task("fallback trace", |c| trace_from_roots(c, trace_slot));

    let found = gc.finref.process::<VM>(metadata, gc.heap.start(), true, &resolve, &|| {
        gc.prepare_trace();
        gc.collectors.run_task("fallback resurrection", |c| {
            drain(c, trace_slot);
            c.flush();
        });
    });
    compact::compact(plan, gc, Liveness::Fallback);
    found
}

fn trace_slot<VM: VMBinding>(collector: &mut Collector<VM>, slot: Slot) {
    let base = collector.gc().heap.start();
    let Some(mut object) = slot.load(base) else {
        return;
    };
    if let Some(copy) = header::forwarding_target(object) {
        slot.store(base, Some(copy));
        object = copy;
    }
    if header::try_mark_in_vtable(object) {
        scan_object(collector, object, false);
    }
}

fn resolve(object: ObjectReference) -> Option<ObjectReference> {
    let object = header::forwarding_target(object).unwrap_or(object);
    header::is_marked_in_vtable(object).then_some(object)
}
