use super::CollectionKind;
use crate::util::header::MarkParity;
use atomic::Atomic;
use bytemuck::NoUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The concurrent phase of the mark-sweep plan. The generational plan stays `Idle`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, NoUninit)]
pub enum ConcurrentPhase {
    Idle = 0,
    /// Collectors are marking while the mutators run.
    Marking = 1,
    /// Collectors are sweeping while the mutators run.
    Sweeping = 2,
}

/// The mutable scheduling state of a GC instance. Everything a collection needs to know about
/// the current cycle lives here, owned by the GC instance, rather than in global variables.
/// The nursery boundary lives in [`crate::policy::heap::HeapLayout`], the forwarding half in
/// [`crate::policy::nursery::NurserySpace`] and the mark delay in
/// [`crate::scheduler::CollectionScheduler`], all owned by the same instance.
pub struct GcRuntimeState {
    mark_parity: Atomic<MarkParity>,
    collection_kind: Atomic<CollectionKind>,
    next_gc_full: AtomicBool,
    phase: Atomic<ConcurrentPhase>,
    /// Bumped when a concurrent sweep starts. Mutators compare it with the epoch they last saw
    /// and give their chunks back to the sweeper when it changed.
    sweep_epoch: AtomicUsize,
    gc_in_progress: AtomicBool,
}

impl Default for GcRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

impl GcRuntimeState {
    pub fn new() -> Self {
        GcRuntimeState {
            mark_parity: Atomic::new(MarkParity::Even),
            collection_kind: Atomic::new(CollectionKind::Minor),
            next_gc_full: AtomicBool::new(false),
            phase: Atomic::new(ConcurrentPhase::Idle),
            sweep_epoch: AtomicUsize::new(0),
            gc_in_progress: AtomicBool::new(false),
        }
    }

    /// The mark bit that means "marked" in the current cycle.
    pub fn mark_parity(&self) -> MarkParity {
        self.mark_parity.load(Ordering::Acquire)
    }

    /// Make every existing mark stale. Called at the end of each cycle.
    pub fn flip_mark_parity(&self) {
        let old = self.mark_parity();
        self.mark_parity.store(old.flip(), Ordering::Release);
    }

    pub fn collection_kind(&self) -> CollectionKind {
        self.collection_kind.load(Ordering::Acquire)
    }

    pub fn set_collection_kind(&self, kind: CollectionKind) {
        self.collection_kind.store(kind, Ordering::Release)
    }

    pub fn next_gc_full(&self) -> bool {
        self.next_gc_full.load(Ordering::Acquire)
    }

    pub fn set_next_gc_full(&self, full: bool) {
        self.next_gc_full.store(full, Ordering::Release)
    }

    pub fn phase(&self) -> ConcurrentPhase {
        self.phase.load(Ordering::Acquire)
    }

    pub fn set_phase(&self, phase: ConcurrentPhase) {
        trace!("Concurrent phase {:?} -> {:?}", self.phase(), phase);
        self.phase.store(phase, Ordering::Release)
    }

    pub fn sweep_epoch(&self) -> usize {
        self.sweep_epoch.load(Ordering::Acquire)
    }

    pub fn bump_sweep_epoch(&self) -> usize {
        self.sweep_epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_gc_in_progress(&self) -> bool {
        self.gc_in_progress.load(Ordering::Acquire)
    }

    pub fn set_gc_in_progress(&self, v: bool) {
        self.gc_in_progress.store(v, Ordering::Release)
    }

    /// The header state given to new objects: marked with the current parity while a
    /// concurrent mark or sweep is running, so the cycle treats them as live.
    pub fn allocation_color(&self) -> Option<MarkParity> {
        match self.phase() {
            ConcurrentPhase::Idle => None,
            ConcurrentPhase::Marking | ConcurrentPhase::Sweeping => Some(self.mark_parity()),
        }
    }
}
