//! Minor collections: survivors of the forwarding region of NOS are copied into MOS blocks
//! owned by the collectors; survivors of the other half (with partial forwarding) are marked
//! in place.
//!
//! In generational mode only NOS is traced, from the roots and the remembered sets. In
//! non-generational mode every reachable object is traced and objects outside NOS are only
//! marked.

use super::GenCompact;
use crate::plan::tracing::{drain, scan_object, trace_from_roots};
use crate::policy::space::Space;
use crate::scheduler::Collector;
use crate::util::conversions;
use crate::util::header::{self, HeaderState, MarkParity};
use crate::util::metadata::GcMetadata;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, Slot, VMBinding};
use crate::GC;
use std::sync::atomic::Ordering;

/// Run a minor collection. Roots must already be enumerated.
///
/// Returns `None` if a survivor could not be promoted; the heap then holds a mix of
/// forwarded and unforwarded nursery objects and a fallback collection must follow.
/// Otherwise returns whether objects became finalizable.
pub(super) fn collect<VM: VMBinding>(plan: &'static GenCompact<VM>, gc: &'static GC<VM>) -> Option<bool> {
    let metadata = &gc.metadata;
    let used_before = plan.nursery.used_bytes();
    let promoted_before = gc.stats.bytes_promoted();
    gc.collect_result.store(true, Ordering::SeqCst);
    if plan.generational {
        remsets_to_tasks(metadata);
    } else {
        metadata.clear_set_pool(&metadata.mutator_remset_pool);
        metadata.clear_set_pool(&metadata.collector_remset_pool);
    }
    gc.finref.push_queue_roots(metadata);

    let parity = gc.state.mark_parity();
    gc.prepare_trace();
    gc.collectors.run_task("minor trace", move |c| {
        trace_from_roots(c, |c, slot| trace_slot(plan, c, slot, parity));
    });

    let mut found = false;
    if gc.collect_result.load(Ordering::SeqCst) {
        found = gc.finref.process::<VM>(
            metadata,
            gc.heap.start(),
            false,
            &|object| resolve(plan, object, parity),
            &|| {
                gc.prepare_trace();
                gc.collectors.run_task("minor resurrection", move |c| {
                    drain(c, |c, slot| trace_slot(plan, c, slot, parity));
                    c.flush();
                });
            },
        );
    }
    gc.collectors
        .run_task("minor release", move |c| c.copy_space.retire(&plan.heap));

    if !gc.collect_result.load(Ordering::SeqCst) {
        return None;
    }
    let promoted = gc.stats.bytes_promoted() - promoted_before;
    plan.nursery.set_survive_ratio(promoted, used_before);
    plan.nursery.release_forwarded_blocks();
    if !plan.generational {
        plan.clear_marks_outside_nursery(gc);
    }
    gc.state
        .set_next_gc_full(plan.mature.free_blocks() < plan.nursery.num_blocks());
    Some(found)
}

/// Turn the remembered slots into trace work. The set buffers go back to their free pool.
fn remsets_to_tasks(metadata: &GcMetadata) {
    let mut task = metadata.free_task_buffer();
    for pool in [&metadata.mutator_remset_pool, &metadata.collector_remset_pool] {
        for buffer in pool.drain() {
            for word in buffer.iter() {
                if task.is_full() {
                    let full = std::mem::replace(&mut task, metadata.free_task_buffer());
                    metadata.mark_task_pool.put(full);
                }
                task.push(word);
            }
            metadata.put_free_set_buffer(buffer);
        }
    }
    if task.is_empty() {
        metadata.put_free_task_buffer(task);
    } else {
        metadata.mark_task_pool.put(task);
    }
}

fn trace_slot<VM: VMBinding>(
    plan: &GenCompact<VM>,
    collector: &mut Collector<VM>,
    slot: Slot,
    parity: MarkParity,
) {
    let heap = &*plan.heap;
    let base = heap.start();
    let Some(object) = slot.load(base) else {
        return;
    };
    if !heap.in_nos(object.to_raw_address()) {
        if !plan.generational && header::try_mark(object, parity) {
            scan_object(collector, object, true);
        }
        return;
    }
    let object = if plan.nursery.in_forward_region(object.to_raw_address()) {
        let Some(new) = forward_object(plan, collector, object, parity) else {
            return;
        };
        if new != object {
            slot.store(base, Some(new));
        }
        new
    } else {
        if header::try_mark(object, parity) {
            scan_object(collector, object, true);
        }
        object
    };
    if plan.generational && heap.in_nos(object.to_raw_address()) {
        let at = slot.address();
        if heap.in_heap(at) && !heap.in_nos(at) {
            collector.remember(slot);
        }
    }
}

/// Copy `object` into the collector's MOS block and install the forwarding pointer, or
/// return the copy another collector installed first. Returns `None` once promotion has
/// failed.
fn forward_object<VM: VMBinding>(
    plan: &GenCompact<VM>,
    collector: &mut Collector<VM>,
    object: ObjectReference,
    parity: MarkParity,
) -> Option<ObjectReference> {
    let gc = collector.gc();
    let mut info = header::load_info(object);
    loop {
        if let HeaderState::Forwarded(to) = header::decode_state(info, parity) {
            return Some(to);
        }
        if !gc.collect_result.load(Ordering::Relaxed) {
            return None;
        }
        let size = conversions::object_size_align(VM::VMObjectModel::get_current_size(object));
        let Some(to) = alloc_copy(plan, collector, size) else {
            if gc.collect_result.swap(false, Ordering::SeqCst) {
                debug!("Mature space exhausted while promoting {} ({} bytes)", object, size);
            }
            return None;
        };
        unsafe {
            std::ptr::copy_nonoverlapping(
                object.to_raw_address().to_ptr::<u8>(),
                to.to_mut_ptr::<u8>(),
                size,
            );
        }
        let copy = unsafe { ObjectReference::from_raw_address_unchecked(to) };
        header::store_info(copy, header::strip_gc_bits(info));
        match header::try_install_forwarding(object, info, copy) {
            Ok(()) => {
                collector.bytes_copied += size;
                scan_object(collector, copy, true);
                return Some(copy);
            }
            Err(current) => {
                collector.copy_space.rewind(to, size);
                info = current;
            }
        }
    }
}

fn alloc_copy<VM: VMBinding>(
    plan: &GenCompact<VM>,
    collector: &mut Collector<VM>,
    size: usize,
) -> Option<Address> {
    if let Some(addr) = collector.copy_space.alloc(size) {
        return Some(addr);
    }
    let block = plan.mature.alloc_block()?;
    collector.copy_space.rebind(&plan.heap, block);
    collector.copy_space.alloc(size)
}

/// Where an object is after the minor trace, for reference and finalizer processing.
fn resolve<VM: VMBinding>(
    plan: &GenCompact<VM>,
    object: ObjectReference,
    parity: MarkParity,
) -> Option<ObjectReference> {
    let addr = object.to_raw_address();
    if !plan.heap.in_nos(addr) {
        return (plan.generational || header::is_marked(object, parity)).then_some(object);
    }
    if plan.nursery.in_forward_region(addr) {
        header::forwarding_target(object)
    } else {
        header::is_marked(object, parity).then_some(object)
    }
}
