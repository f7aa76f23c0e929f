use crate::plan::CollectionKind;
use enum_map::EnumMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Counters and timers of the collector. All counters are updated by the thread that drives a
/// collection, or by collectors through atomic adds, and can be read at any time.
#[derive(Default)]
pub struct GcStats {
    collections: AtomicUsize,
    per_kind: EnumMap<CollectionKind, AtomicUsize>,
    total_pause_nanos: AtomicU64,
    last_pause_nanos: AtomicU64,
    bytes_promoted: AtomicUsize,
    bytes_reclaimed: AtomicUsize,
    objects_traced: AtomicUsize,
    pinned_roots: AtomicUsize,
    pinned_warning_issued: AtomicBool,
}

impl GcStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_collection(&self, kind: CollectionKind) -> usize {
        self.per_kind[kind].fetch_add(1, Ordering::Relaxed);
        self.collections.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// A collection that was started as one kind and finished as another (a failed minor
    /// collection that fell back) is counted under both.
    pub fn count_kind(&self, kind: CollectionKind) {
        self.per_kind[kind].fetch_add(1, Ordering::Relaxed);
    }

    pub fn end_collection(&self, pause: Duration) {
        let nanos = pause.as_nanos() as u64;
        self.total_pause_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.last_pause_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn collections(&self) -> usize {
        self.collections.load(Ordering::SeqCst)
    }

    pub fn collections_of(&self, kind: CollectionKind) -> usize {
        self.per_kind[kind].load(Ordering::Relaxed)
    }

    pub fn total_pause(&self) -> Duration {
        Duration::from_nanos(self.total_pause_nanos.load(Ordering::Relaxed))
    }

    pub fn last_pause(&self) -> Duration {
        Duration::from_nanos(self.last_pause_nanos.load(Ordering::Relaxed))
    }

    pub fn add_bytes_promoted(&self, bytes: usize) {
        self.bytes_promoted.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn bytes_promoted(&self) -> usize {
        self.bytes_promoted.load(Ordering::Relaxed)
    }

    pub fn add_bytes_reclaimed(&self, bytes: usize) {
        self.bytes_reclaimed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn bytes_reclaimed(&self) -> usize {
        self.bytes_reclaimed.load(Ordering::Relaxed)
    }

    pub fn add_objects_traced(&self, objects: usize) {
        self.objects_traced.fetch_add(objects, Ordering::Relaxed);
    }

    pub fn objects_traced(&self) -> usize {
        self.objects_traced.load(Ordering::Relaxed)
    }

    /// Record a pinned root. Returns true the first time, so the caller can warn once.
    pub fn note_pinned_root(&self) -> bool {
        self.pinned_roots.fetch_add(1, Ordering::Relaxed);
        !self.pinned_warning_issued.swap(true, Ordering::Relaxed)
    }

    pub fn pinned_roots(&self) -> usize {
        self.pinned_roots.load(Ordering::Relaxed)
    }

    pub fn print_stats(&self) {
        info!(
            "collections: {} (minor {}, major {}, fallback {}, mark-sweep {}), total pause {:?}, promoted {}, reclaimed {}",
            self.collections(),
            self.collections_of(CollectionKind::Minor),
            self.collections_of(CollectionKind::Major),
            self.collections_of(CollectionKind::Fallback),
            self.collections_of(CollectionKind::MarkSweep),
            self.total_pause(),
            crate::util::conversions::bytes_to_formatted_string(self.bytes_promoted()),
            crate::util::conversions::bytes_to_formatted_string(self.bytes_reclaimed()),
        );
    }
}
