//! The concurrent mark-sweep cycle.
//!
//! A cycle has three short pauses:
//!
//! 1. *Start*: the referents of the roots and of the runtime-visible queues are copied into
//!    buffers owned by the plan, and the collectors start marking from them while the
//!    mutators run. New objects are allocated marked.
//! 2. *Remark*: the dirty objects recorded by the write barrier are processed (and with the
//!    mostly-concurrent algorithm the roots are traced again), references and finalizers are
//!    processed, LOS is swept, and the collectors start sweeping the sweep space while the
//!    mutators run.
//! 3. *Finish*: chunks the sweepers skipped because a mutator held them are swept, and the
//!    mark parity flips.
//!
//! Phases advance from [`poll`], called on allocation slow paths, or all at once from
//! [`complete_cycle`] when a collection is needed now.

use super::mark::{self, mark_dirty_objects, mark_slot};
use super::MarkSweep;
use crate::plan::tracing::{drain, trace_from_roots};
use crate::plan::{CollectionKind, ConcurrentPhase, Plan};
use crate::scheduler::CollectionSample;
use crate::util::conversions;
use crate::util::header;
use crate::util::metadata::MetadataBuffer;
use crate::util::options::ConcurrentAlgorithm;
use crate::util::ObjectReference;
use crate::vm::{Collection, Slot, VMBinding};
use crate::GC;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Bookkeeping of a concurrent cycle, from its first pause to its last.
pub(crate) struct CycleInfo {
    count: usize,
    start: Instant,
    mutator_time: Duration,
    trace_time: Duration,
    pause: Duration,
    used_before: usize,
    traced_before: usize,
    finalizable: bool,
}

/// Advance the concurrent cycle if the scheduler or the collectors are ready. The caller
/// holds the collection lock. Returns true if a phase changed.
pub(super) fn poll<VM: VMBinding>(plan: &'static MarkSweep<VM>, gc: &'static GC<VM>) -> bool {
    match gc.state.phase() {
        ConcurrentPhase::Idle => {
            if !plan
                .scheduler
                .should_start_mark(plan.used_bytes(gc), plan.heap.committed_bytes())
            {
                return false;
            }
            start_marking(plan, gc);
        }
        ConcurrentPhase::Marking => {
            if !gc.collectors.is_task_finished() {
                return false;
            }
            remark(plan, gc);
        }
        ConcurrentPhase::Sweeping => {
            if !gc.collectors.is_task_finished() {
                return false;
            }
            finish_sweep(plan, gc);
        }
    }
    true
}

/// Run the rest of the current cycle, waiting for the collectors. Returns true if a cycle
/// was in progress.
pub(super) fn complete_cycle<VM: VMBinding>(plan: &'static MarkSweep<VM>, gc: &'static GC<VM>) -> bool {
    let phase = gc.state.phase();
    if phase == ConcurrentPhase::Idle {
        return false;
    }
    debug!("Completing the concurrent cycle from phase {:?}", phase);
    if phase == ConcurrentPhase::Marking {
        gc.collectors.wait_for_task();
        remark(plan, gc);
    }
    gc.collectors.wait_for_task();
    finish_sweep(plan, gc);
    true
}

fn begin_pause<VM: VMBinding>(gc: &GC<VM>) -> Instant {
    let start = Instant::now();
    gc.state.set_gc_in_progress(true);
    gc.stop_mutators();
    start
}

fn end_pause<VM: VMBinding>(plan: &MarkSweep<VM>, gc: &GC<VM>, start: Instant) {
    if let Some(cycle) = plan.cycle.lock().as_mut() {
        cycle.pause += start.elapsed();
    }
    gc.state.set_gc_in_progress(false);
    gc.resume_mutators();
}

fn start_marking<VM: VMBinding>(plan: &'static MarkSweep<VM>, gc: &'static GC<VM>) {
    let start = begin_pause(gc);
    let count = gc.stats.start_collection(CollectionKind::MarkSweep);
    gc.state.set_collection_kind(CollectionKind::MarkSweep);
    debug!("Collection #{} starts: concurrent {} mark", count, plan.algorithm);
    gc.verify_if_enabled("before concurrent mark", false);
    *plan.cycle.lock() = Some(CycleInfo {
        count,
        start,
        mutator_time: plan.scheduler.mutator_time(),
        trace_time: Duration::ZERO,
        pause: Duration::ZERO,
        used_before: plan.used_bytes(gc),
        traced_before: gc.stats.objects_traced(),
        finalizable: false,
    });

    gc.enumerate_roots();
    snapshot_referents(plan, gc);
    gc.metadata.release_roots();

    let parity = gc.state.mark_parity();
    gc.state.set_phase(ConcurrentPhase::Marking);
    gc.prepare_trace();
    gc.collectors.post_task("concurrent mark", move |c| {
        drain(c, move |c, slot| mark_slot(c, slot, parity));
        c.flush();
    });
    end_pause(plan, gc, start);
}

/// Copy the current referents of the roots and queue entries into buffers owned by the plan,
/// and make their entries trace work. Root slots change once the mutators resume; the copies
/// do not.
fn snapshot_referents<VM: VMBinding>(plan: &MarkSweep<VM>, gc: &GC<VM>) {
    let metadata = &gc.metadata;
    let base = gc.heap.start();
    let mut referents: Vec<ObjectReference> = vec![];
    metadata.for_each_root(|word| {
        if let Some(object) = Slot::decode(word).load(base) {
            referents.push(object);
        }
    });
    gc.finref.for_each_queue_slot(|slot| {
        if let Some(object) = slot.load(base) {
            referents.push(object);
        }
    });

    let mut snapshot = plan.root_snapshot.lock();
    for objects in referents.chunks(MetadataBuffer::CAPACITY) {
        let mut buffer = metadata.free_set_buffer();
        let mut task = metadata.free_task_buffer();
        for (i, object) in objects.iter().enumerate() {
            buffer.push(object.to_raw_address().as_usize());
            task.push(Slot::Full(buffer.slot_of(i)).encode());
        }
        metadata.mark_task_pool.put(task);
        snapshot.push(buffer);
    }
    trace!("Snapshot of {} root referents", referents.len());
}

fn release_snapshot<VM: VMBinding>(plan: &MarkSweep<VM>, gc: &GC<VM>) {
    for buffer in plan.root_snapshot.lock().drain(..) {
        gc.metadata.put_free_set_buffer(buffer);
    }
}

fn remark<VM: VMBinding>(plan: &'static MarkSweep<VM>, gc: &'static GC<VM>) {
    let start = begin_pause(gc);
    gc.collectors.wait_for_task();
    release_snapshot(plan, gc);
    let metadata = &gc.metadata;
    let parity = gc.state.mark_parity();

    if plan.algorithm == ConcurrentAlgorithm::MostlyConcurrent {
        gc.enumerate_roots();
    }
    gc.finref.push_queue_roots(metadata);
    gc.prepare_trace();
    gc.collectors.run_task("remark", move |c| {
        mark_dirty_objects(c, parity);
        trace_from_roots(c, move |c, slot| mark_slot(c, slot, parity));
    });
    let finalizable = mark::process_finref(gc, parity);
    gc.metadata.release_roots();

    let los_reclaimed = gc.los.sweep(|object| header::is_marked(object, parity));
    if let Some(cycle) = plan.cycle.lock().as_mut() {
        cycle.trace_time = cycle.start.elapsed();
        cycle.finalizable = finalizable;
    }
    plan.reclaimed.store(los_reclaimed, Ordering::SeqCst);
    plan.space.prepare_sweep();
    gc.state.set_phase(ConcurrentPhase::Sweeping);
    gc.state.bump_sweep_epoch();
    gc.collectors.post_task("concurrent sweep", move |_| {
        let bytes = plan.space.sweep_claimed(parity);
        plan.reclaimed.fetch_add(bytes, Ordering::Relaxed);
    });
    end_pause(plan, gc, start);
}

fn finish_sweep<VM: VMBinding>(plan: &'static MarkSweep<VM>, gc: &'static GC<VM>) {
    let start = begin_pause(gc);
    gc.collectors.wait_for_task();
    let parity = gc.state.mark_parity();
    plan.space.release_all_owned();
    let reclaimed = plan.reclaimed.swap(0, Ordering::SeqCst) + plan.space.sweep_unswept(parity);
    gc.state.flip_mark_parity();
    gc.state.set_phase(ConcurrentPhase::Idle);
    plan.adjust_heap_size(gc);
    gc.verify_if_enabled("after concurrent sweep", false);
    gc.stats.add_bytes_reclaimed(reclaimed);

    let Some(cycle) = plan.cycle.lock().take() else {
        end_pause(plan, gc, start);
        return;
    };
    let pause = cycle.pause + start.elapsed();
    gc.stats.end_collection(pause);
    let traced = gc.stats.objects_traced() - cycle.traced_before;
    let sample = CollectionSample {
        objects_traced: traced,
        trace_time: cycle.trace_time,
        bytes_freed: reclaimed,
        mutator_time: cycle.mutator_time,
    };
    plan.scheduler.record_cycle(sample, plan.free_bytes(gc), traced);
    info!(
        "Concurrent MarkSweep collection #{}: {} -> {}, {} reclaimed, paused {:?} of {:?}",
        cycle.count,
        conversions::bytes_to_formatted_string(cycle.used_before),
        conversions::bytes_to_formatted_string(plan.used_bytes(gc)),
        conversions::bytes_to_formatted_string(reclaimed),
        pause,
        cycle.start.elapsed()
    );
    end_pause(plan, gc, start);
    if cycle.finalizable {
        VM::VMCollection::schedule_finalization();
    }
}
