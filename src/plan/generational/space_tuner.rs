//! Moving the boundary between LOS and MOS at major collections.

use crate::policy::space;
use crate::util::constants::BYTES_IN_BLOCK;
use crate::util::conversions;
use crate::vm::VMBinding;
use crate::GC;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The smallest step by which the boundary moves.
pub const TUNING_GRANULARITY: usize = 4 * BYTES_IN_BLOCK;

/// A boundary move decided for one major collection. Both kinds force a sliding compaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TuneKind {
    None,
    /// Give this many bytes from the bottom of MOS to the top of LOS.
    MosToLos(usize),
    /// Give this many bytes from the top of LOS to the bottom of MOS. LOS is slid down first.
    LosToMos(usize),
}

/// What the tuner looks at, after the large object space has been swept.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct TunerInput {
    /// The largest LOS request that failed since the last major collection.
    pub failed_request: usize,
    pub los_size: usize,
    pub los_free: usize,
    /// The free area at the top of LOS, next to MOS.
    pub los_top_free: usize,
    pub los_largest_free: usize,
    /// Bytes allocated in LOS since the last major collection.
    pub los_speed: usize,
    /// Bytes promoted into MOS since the last major collection.
    pub mos_speed: usize,
    /// Bytes of free MOS and NOS blocks.
    pub mos_free: usize,
}

impl TunerInput {
    /// Free LOS memory that no single request can use.
    pub fn wasted(&self) -> usize {
        self.los_free - self.los_largest_free
    }
}

pub(crate) fn decide(input: &TunerInput) -> TuneKind {
    if input.failed_request > 0 {
        if input.los_largest_free >= input.failed_request {
            return TuneKind::None;
        }
        let needed = input.failed_request.saturating_sub(input.los_top_free);
        let tuning = conversions::raw_align_up(needed, BYTES_IN_BLOCK).max(TUNING_GRANULARITY);
        if tuning > input.mos_free {
            return TuneKind::None;
        }
        return TuneKind::MosToLos(tuning);
    }
    let spare = input.los_free.saturating_sub(input.los_speed);
    if spare > 2 * TUNING_GRANULARITY && input.mos_speed > input.los_speed {
        let tuning = conversions::raw_align_down(spare / 2, BYTES_IN_BLOCK)
            .min(input.los_size.saturating_sub(BYTES_IN_BLOCK));
        if tuning > 0 {
            return TuneKind::LosToMos(tuning);
        }
    }
    TuneKind::None
}

pub struct SpaceTuner {
    enabled: bool,
    promoted_at_last_major: AtomicUsize,
}

impl SpaceTuner {
    pub fn new(enabled: bool) -> Self {
        SpaceTuner {
            enabled,
            promoted_at_last_major: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Decide the boundary move of the major collection in progress. The large object space
    /// must already be swept.
    pub(crate) fn decide<VM: VMBinding>(&self, gc: &GC<VM>) -> TuneKind {
        if !self.enabled {
            return TuneKind::None;
        }
        let heap = &gc.heap;
        let los_end = heap.los_end();
        let input = TunerInput {
            failed_request: gc.los.failed_request(),
            los_size: los_end - heap.start(),
            los_free: gc.los.total_free(),
            los_top_free: los_end - gc.los.free_top_start(los_end),
            los_largest_free: gc.los.largest_free_area(),
            los_speed: gc.los.allocated_since_major(),
            mos_speed: gc
                .stats
                .bytes_promoted()
                .saturating_sub(self.promoted_at_last_major.load(Ordering::Relaxed)),
            mos_free: conversions::blocks_to_bytes(space::free_block_count(
                heap,
                heap.los_end_block()..heap.committed_end_block(),
            )),
        };
        let kind = decide(&input);
        debug!(
            "Space tuner: {:?} (failed request {}, LOS free {}, wasted {})",
            kind,
            input.failed_request,
            input.los_free,
            input.wasted()
        );
        kind
    }

    /// Start a new measurement period. Called at the end of each major collection.
    pub(crate) fn reset<VM: VMBinding>(&self, gc: &GC<VM>) {
        self.promoted_at_last_major
            .store(gc.stats.bytes_promoted(), Ordering::Relaxed);
    }
}
