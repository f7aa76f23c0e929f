//! Major collections and the compaction of MOS and NOS.
//!
//! Compaction runs in phases separated by collector barriers:
//!
//! 0. Sweep (or slide-plan) LOS and let the space tuner pick a boundary move. Mark every
//!    block of the compaction area as a source (`Used`) or an empty target (`Dest`).
//! 1. Each collector claims source blocks in address order, picks a target address for each
//!    live object, and installs it as a forwarding pointer. Targets are claimed from blocks
//!    that have been fully planned (`Compacted`) or were empty (`Dest`), and only below the
//!    source; a source with no target available compacts into itself. Slide-compact fills
//!    targets strictly in order. Move-compact also back-fills the tail of the previous target
//!    with later objects that fit, so object order is not kept.
//! 2. If the tuner gives MOS space to LOS, every target is shifted up by the tuning amount.
//! 3. Every slot of every live object, every root and every finalizer queue entry is
//!    redirected to the forwarding target.
//! 4. Live large objects are slid down if LOS gives space to MOS.
//! 5. Objects are copied. A collector copies into a block only after every object that lived
//!    there has been copied out; blocks are planned in an order that makes this wait finite.
//! 6. The shift of step 2 is applied to the compacted data in one move, hashes are restored,
//!    block states are rebuilt, and LOS takes its new space.

use super::space_tuner::TuneKind;
use super::GenCompact;
use crate::plan::tracing::trace_from_roots;
use crate::policy::block::{BlockIndex, BlockStatus};
use crate::policy::heap::HeapLayout;
use crate::policy::largeobjectspace::LosMove;
use crate::scheduler::Collector;
use crate::util::constants::BYTES_IN_BLOCK;
use crate::util::conversions;
use crate::util::header::{self, MarkParity};
use crate::util::options::MajorAlgorithm;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, Slot, VMBinding};
use crate::GC;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// How compaction tells live objects from dead ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Liveness {
    /// Marked in the object-info word with this parity.
    Marked(MarkParity),
    /// Marked in the vtable word by a fallback trace.
    Fallback,
}

impl Liveness {
    #[inline]
    fn is_live(self, object: ObjectReference) -> bool {
        match self {
            Liveness::Marked(parity) => header::is_marked(object, parity),
            Liveness::Fallback => header::is_marked_in_vtable(object),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct ObjectMove {
    from: ObjectReference,
    /// The compacted address, before any shift.
    to: ObjectReference,
    size: usize,
}

#[derive(Debug)]
struct SourceBlock {
    block: BlockIndex,
    /// Live objects of the block, in address order.
    moves: Vec<ObjectMove>,
}

/// The per-collector state of a compaction.
#[derive(Debug, Default)]
pub(crate) struct CompactLocal {
    sources: Vec<SourceBlock>,
    /// Compacted addresses and stripped info words of live hashed objects.
    hashed: Vec<(ObjectReference, usize)>,
    /// The target block being filled and its fill cursor.
    target: Option<(BlockIndex, Address)>,
    /// Move-compact only: the last target given up on, whose tail still takes objects that
    /// fit.
    spare: Option<(BlockIndex, Address)>,
}

/// Cursors shared by the collectors of a compaction.
#[derive(Default)]
pub(super) struct CompactCursors {
    source: AtomicUsize,
    target: AtomicUsize,
    end: AtomicUsize,
    seq: AtomicUsize,
}

impl CompactCursors {
    fn reset(&self, first: BlockIndex, end: BlockIndex) {
        self.source.store(first, Ordering::SeqCst);
        self.target.store(first, Ordering::SeqCst);
        self.end.store(end, Ordering::SeqCst);
        self.seq.store(0, Ordering::SeqCst);
    }

    fn claim_source(&self, heap: &HeapLayout) -> Option<BlockIndex> {
        let end = self.end.load(Ordering::SeqCst);
        loop {
            let i = self.source.fetch_add(1, Ordering::SeqCst);
            if i >= end {
                return None;
            }
            if heap
                .blocks
                .cas_status(i, BlockStatus::Used, BlockStatus::InCompact)
            {
                return Some(i);
            }
        }
    }

    /// Claim the lowest plannable block below `limit` as a target.
    fn claim_target(&self, heap: &HeapLayout, limit: BlockIndex) -> Option<BlockIndex> {
        let mut i = self.target.load(Ordering::SeqCst);
        while i < limit {
            let status = heap.blocks.status(i);
            match status {
                BlockStatus::Compacted | BlockStatus::Dest => {
                    if heap.blocks.cas_status(i, status, BlockStatus::Target) {
                        let _ = self.target.compare_exchange(i, i + 1, Ordering::SeqCst, Ordering::SeqCst);
                        return Some(i);
                    }
                }
                BlockStatus::Target => {
                    let _ = self.target.compare_exchange(i, i + 1, Ordering::SeqCst, Ordering::SeqCst);
                }
                _ => {}
            }
            i += 1;
        }
        None
    }
}

/// Mark the whole heap, process references and finalizers, and compact. Roots must already
/// be enumerated. Returns whether objects became finalizable.
pub(super) fn major<VM: VMBinding>(plan: &'static GenCompact<VM>, gc: &'static GC<VM>) -> bool {
    let metadata = &gc.metadata;
    metadata.clear_set_pool(&metadata.mutator_remset_pool);
    metadata.clear_set_pool(&metadata.collector_remset_pool);
    gc.finref.push_queue_roots(metadata);

    let parity = gc.state.mark_parity();
    gc.prepare_trace();
    gc.collectors.run_task("major mark", move |c| {
        trace_from_roots(c, |c, slot| mark_slot(c, slot, parity));
    });
    let found = gc.finref.process::<VM>(
        metadata,
        gc.heap.start(),
        true,
        &|object| header::is_marked(object, parity).then_some(object),
        &|| {
            gc.prepare_trace();
            gc.collectors.run_task("major resurrection", move |c| {
                crate::plan::tracing::drain(c, |c, slot| mark_slot(c, slot, parity));
                c.flush();
            });
        },
    );
    compact(plan, gc, Liveness::Marked(parity));
    found
}

fn mark_slot<VM: VMBinding>(collector: &mut Collector<VM>, slot: Slot, parity: MarkParity) {
    let Some(object) = slot.load(collector.gc().heap.start()) else {
        return;
    };
    if header::try_mark(object, parity) {
        crate::plan::tracing::scan_object(collector, object, false);
    }
}

/// Compact MOS and NOS into the bottom of MOS and reclaim dead large objects. Marks and
/// fallback marks of every surviving object are cleared.
pub(super) fn compact<VM: VMBinding>(plan: &'static GenCompact<VM>, gc: &'static GC<VM>, liveness: Liveness) {
    let heap = &*plan.heap;

    // Phase 0.
    let los_reclaimed = gc.los.sweep(|o| liveness.is_live(o));
    let mut tune = plan.tuner.decide(gc);
    let slide_los = matches!(tune, TuneKind::LosToMos(_));
    let los_live: Vec<LosMove> = if slide_los {
        gc.los.plan_slide(|_| true)
    } else {
        gc.los
            .objects()
            .into_iter()
            .map(|(o, size)| LosMove { from: o, to: o, size })
            .collect()
    };
    let los_infos: Vec<usize> = los_live
        .iter()
        .map(|m| header::strip_gc_bits(header::load_info(m.from)))
        .collect();
    if let TuneKind::LosToMos(bytes) = tune {
        let los_end = heap.los_end();
        let floor = conversions::block_align_up(gc.los.slide_end(&los_live))
            .max(heap.start() + BYTES_IN_BLOCK);
        let bytes = conversions::raw_align_down(bytes.min(los_end - floor), BYTES_IN_BLOCK);
        tune = if bytes == 0 {
            TuneKind::None
        } else {
            heap.set_los_end(los_end - bytes);
            TuneKind::LosToMos(bytes)
        };
    }
    for m in los_live.iter().filter(|m| m.to != m.from) {
        header::set_forwarding(m.from, m.to);
    }
    let algorithm = if tune != TuneKind::None || liveness == Liveness::Fallback {
        MajorAlgorithm::SlideCompact
    } else {
        plan.major_algorithm
    };

    let first = heap.los_end_block();
    let end = heap.committed_end_block();
    for i in first..end {
        match heap.blocks.status(i) {
            BlockStatus::Free => {
                heap.blocks.set_status(i, BlockStatus::Dest);
                heap.blocks.set_moved_out(i, true);
            }
            BlockStatus::Used => heap.blocks.set_moved_out(i, false),
            status => debug_assert!(false, "block {} is {:?} at the start of compaction", i, status),
        }
        heap.blocks.set_new_free(i, heap.blocks.start(i));
    }
    plan.cursors.reset(first, end);
    debug!(
        "Compacting blocks {}..{} with {:?}, tuning {:?}, LOS reclaimed {}",
        first,
        end,
        algorithm,
        tune,
        conversions::bytes_to_formatted_string(los_reclaimed)
    );

    // Phase 1.
    gc.collectors.run_task("compute targets", move |c| {
        compute_targets(plan, c, liveness, algorithm)
    });

    // Phase 2.
    let compacted_end = (first..end)
        .filter(|i| heap.blocks.status(*i) == BlockStatus::Target)
        .map(|i| heap.blocks.new_free(i))
        .max()
        .unwrap_or_else(|| heap.blocks.start(first));
    let mut delta = 0;
    if let TuneKind::MosToLos(bytes) = tune {
        if conversions::block_align_up(compacted_end) + bytes <= heap.committed_end() {
            delta = bytes;
        } else {
            debug!("Not enough free space to give {} bytes of MOS to LOS", bytes);
        }
    }
    if delta > 0 {
        gc.collectors.run_task("shift targets", move |c| {
            for source in c.compact.sources.iter() {
                for m in source.moves.iter() {
                    header::set_forwarding(m.from, shifted(m.to, delta));
                }
            }
        });
    }

    // Phase 3.
    gc.metadata.reset_root_cursor();
    let los_live = Arc::new(los_live);
    {
        let los_live = los_live.clone();
        gc.collectors
            .run_task("fix slots", move |c| fix_slots(plan, c, &los_live));
    }

    // Phase 4.
    if slide_los {
        gc.los.apply_slide(&los_live);
    }
    for (m, info) in los_live.iter().zip(los_infos) {
        header::store_info(m.to, info);
        header::clear_vtable_mark(m.to);
    }

    // Phase 5.
    gc.collectors
        .run_task("move objects", move |c| move_objects(plan, c));

    // Phase 6.
    let targets: Vec<(BlockIndex, Address)> = (first..end)
        .filter(|i| heap.blocks.status(*i) == BlockStatus::Target)
        .map(|i| (i, heap.blocks.new_free(i)))
        .collect();
    let area_start = heap.blocks.start(first);
    if delta > 0 && compacted_end > area_start {
        unsafe {
            std::ptr::copy(
                area_start.to_ptr::<u8>(),
                (area_start + delta).to_mut_ptr::<u8>(),
                compacted_end - area_start,
            );
        }
    }
    for i in first..end {
        heap.blocks.reset(i);
    }
    let delta_blocks = conversions::bytes_to_blocks(delta);
    for (block, new_free) in targets {
        let block = block + delta_blocks;
        heap.blocks.set_free(block, new_free + delta);
        heap.blocks.set_status(block, BlockStatus::Used);
    }
    gc.collectors.run_task("restore hashes", move |c| {
        for (object, info) in c.compact.hashed.drain(..) {
            header::store_info(shifted(object, delta), info);
        }
        c.compact.sources.clear();
        c.compact.target = None;
        c.compact.spare = None;
    });
    if delta > 0 {
        let old = heap.los_end();
        heap.set_nos_start(heap.committed_end());
        heap.set_los_end(old + delta);
        gc.los.grow_to(old, old + delta);
        debug!("LOS grown by {}", conversions::bytes_to_formatted_string(delta));
    }
}

fn shifted(object: ObjectReference, delta: usize) -> ObjectReference {
    unsafe { ObjectReference::from_raw_address_unchecked(object.to_raw_address() + delta) }
}

fn compute_targets<VM: VMBinding>(
    plan: &GenCompact<VM>,
    collector: &mut Collector<VM>,
    liveness: Liveness,
    algorithm: MajorAlgorithm,
) {
    let heap = &*plan.heap;
    let local = &mut collector.compact;
    let mut live = vec![];
    while let Some(source) = plan.cursors.claim_source(heap) {
        live.clear();
        heap.blocks.for_each_object::<VM>(source, |object, size| {
            if liveness.is_live(object) {
                live.push((object, size));
            }
        });
        let mut moves = Vec::with_capacity(live.len());
        for &(object, size) in live.iter() {
            let to = place(plan, local, source, size, algorithm);
            let info = header::load_info(object);
            if header::has_hash(info) {
                local.hashed.push((to, header::strip_gc_bits(info)));
            }
            if to != object {
                header::set_forwarding(object, to);
            }
            moves.push(ObjectMove {
                from: object,
                to,
                size,
            });
        }
        heap.blocks
            .set_compute_seq(source, plan.cursors.seq.fetch_add(1, Ordering::SeqCst));
        let is_own_target = matches!(local.target, Some((t, _)) if t == source);
        heap.blocks.set_status(
            source,
            if is_own_target {
                BlockStatus::Target
            } else {
                BlockStatus::Compacted
            },
        );
        local.sources.push(SourceBlock {
            block: source,
            moves,
        });
    }
    for (t, cursor) in local.target.take().into_iter().chain(local.spare.take()) {
        heap.blocks.set_new_free(t, cursor);
    }
}

/// Pick the compacted address of an object of `size` bytes from block `source`.
fn place<VM: VMBinding>(
    plan: &GenCompact<VM>,
    local: &mut CompactLocal,
    source: BlockIndex,
    size: usize,
    algorithm: MajorAlgorithm,
) -> ObjectReference {
    let heap = &*plan.heap;
    if let Some((s, cursor)) = local.spare {
        if cursor + size <= heap.blocks.end(s) {
            local.spare = Some((s, cursor + size));
            return unsafe { ObjectReference::from_raw_address_unchecked(cursor) };
        }
    }
    loop {
        if let Some((t, cursor)) = local.target {
            if cursor + size <= heap.blocks.end(t) {
                local.target = Some((t, cursor + size));
                return unsafe { ObjectReference::from_raw_address_unchecked(cursor) };
            }
            match algorithm {
                MajorAlgorithm::SlideCompact => heap.blocks.set_new_free(t, cursor),
                MajorAlgorithm::MoveCompact => {
                    if let Some((s, spare_cursor)) = local.spare.replace((t, cursor)) {
                        heap.blocks.set_new_free(s, spare_cursor);
                    }
                }
            }
        }
        // Targets always lie below the source, so live data packs toward the area start and
        // every copy waits only on lower blocks.
        let t = plan.cursors.claim_target(heap, source).unwrap_or(source);
        local.target = Some((t, heap.blocks.start(t)));
    }
}

#[inline]
fn fix_slot(slot: Slot, base: Address) {
    if let Some(object) = slot.load(base) {
        if let Some(to) = header::forwarding_target(object) {
            slot.store(base, Some(to));
        }
    }
}

fn fix_slots<VM: VMBinding>(plan: &GenCompact<VM>, collector: &mut Collector<VM>, los_live: &[LosMove]) {
    let gc = collector.gc();
    let base = plan.heap.start();
    gc.metadata
        .for_each_claimed_root(|word| fix_slot(Slot::decode(word), base));
    let mut fix = |slot: Address| fix_slot(Slot::Full(slot), base);
    for source in collector.compact.sources.iter() {
        for m in source.moves.iter() {
            VM::VMObjectModel::scan_object(m.from, &mut fix);
        }
    }
    let n = gc.collectors.num_collectors();
    for m in los_live.iter().skip(collector.ordinal()).step_by(n) {
        VM::VMObjectModel::scan_object(m.from, &mut fix);
    }
    if collector.ordinal() == 0 {
        gc.finref.for_each_live_slot(|slot| fix_slot(slot, base));
    }
}

fn move_objects<VM: VMBinding>(plan: &GenCompact<VM>, collector: &mut Collector<VM>) {
    let heap = &*plan.heap;
    for source in collector.compact.sources.iter() {
        for m in source.moves.iter() {
            let from = m.from.to_raw_address();
            let to = m.to.to_raw_address();
            if to != from {
                let target = heap.block_index(to);
                if target != source.block {
                    while !heap.blocks.is_moved_out(target) {
                        std::hint::spin_loop();
                        std::thread::yield_now();
                    }
                }
                unsafe { std::ptr::copy(from.to_ptr::<u8>(), to.to_mut_ptr::<u8>(), m.size) };
            }
            header::store_info(m.to, 0);
            header::clear_vtable_mark(m.to);
        }
        heap.blocks.set_moved_out(source.block, true);
    }
}
