use crate::util::metadata::{GcMetadata, MetadataBuffer};
use crate::util::statistics::GcStats;
use crate::util::{Address, ObjectReference};
use crate::vm::{Slot, VMBinding};

/// Root enumeration, implemented by the runtime.
pub trait Scanning<VM: VMBinding> {
    /// Report every root slot to `roots`. Called while all mutators are stopped. Roots are
    /// thread stacks, registers spilled to memory, globals and handles; each is the address of
    /// a word (or a compressed 32-bit word) holding an object reference or zero.
    fn enumerate_roots(roots: &mut RootSetBuilder);
}

/// Collects root slots into metadata buffers for the collection that is about to run.
pub struct RootSetBuilder<'a> {
    metadata: &'a GcMetadata,
    stats: &'a GcStats,
    heap_start: Address,
    heap_end: Address,
    current: Option<Box<MetadataBuffer>>,
    count: usize,
}

impl<'a> RootSetBuilder<'a> {
    pub(crate) fn new(
        metadata: &'a GcMetadata,
        stats: &'a GcStats,
        heap_start: Address,
        heap_end: Address,
    ) -> Self {
        RootSetBuilder {
            metadata,
            stats,
            heap_start,
            heap_end,
            current: None,
            count: 0,
        }
    }

    /// Add a slot holding a full-width reference.
    pub fn add_root(&mut self, slot: Address) {
        self.push(Slot::Full(slot));
    }

    /// Add a slot holding a compressed 32-bit reference.
    pub fn add_compressed_root(&mut self, slot: Address) {
        self.push(Slot::Compressed(slot));
    }

    /// Add a root whose referent the runtime would like not to move. Pinning is not
    /// supported: the root is treated as an ordinary root and the referent may still move.
    pub fn add_pinned_root(&mut self, slot: Address) {
        if self.stats.note_pinned_root() {
            warn!("Pinned roots are not supported. Objects referenced by pinned roots may still move.");
        }
        self.add_root(slot);
    }

    /// The number of roots added so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn push(&mut self, slot: Slot) {
        let value = slot.load(self.heap_start);
        debug_assert!(
            value.map_or(true, |o| self.is_valid(o)),
            "Root slot {:?} holds {:?}, which is not a heap address",
            slot,
            value
        );
        if self.current.as_ref().map_or(true, |b| b.is_full()) {
            self.flush();
            self.current = Some(self.metadata.free_set_buffer());
        }
        if let Some(b) = self.current.as_mut() {
            b.push(slot.encode());
        }
        self.count += 1;
    }

    fn is_valid(&self, object: ObjectReference) -> bool {
        let a = object.to_raw_address();
        a >= self.heap_start && a < self.heap_end
    }

    fn flush(&mut self) {
        if let Some(b) = self.current.take() {
            self.metadata
                .put_set_buffer_into(&self.metadata.gc_rootset_pool, b);
        }
    }
}

impl Drop for RootSetBuilder<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}
