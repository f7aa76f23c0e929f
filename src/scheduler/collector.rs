use crate::plan::generational::CompactLocal;
use crate::util::bump::BumpPointer;
use crate::util::metadata::MetadataBuffer;
use crate::util::ObjectReference;
use crate::vm::{ReferenceKind, Slot, VMBinding};
use crate::GC;
use enum_map::EnumMap;

/// The private state of one collector thread. It lives as long as the thread and is reused
/// across collections.
pub struct Collector<VM: VMBinding> {
    ordinal: usize,
    gc: &'static GC<VM>,
    trace_stack: Option<Box<MetadataBuffer>>,
    remset: Option<Box<MetadataBuffer>>,
    references: EnumMap<ReferenceKind, Option<Box<MetadataBuffer>>>,
    /// Where survivors are copied to during a minor collection.
    pub(crate) copy_space: BumpPointer,
    pub(crate) compact: CompactLocal,
    pub(crate) objects_traced: usize,
    pub(crate) bytes_copied: usize,
}

impl<VM: VMBinding> Collector<VM> {
    pub fn new(ordinal: usize, gc: &'static GC<VM>) -> Self {
        Collector {
            ordinal,
            gc,
            trace_stack: None,
            remset: None,
            references: EnumMap::default(),
            copy_space: BumpPointer::new(),
            compact: CompactLocal::default(),
            objects_traced: 0,
            bytes_copied: 0,
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn gc(&self) -> &'static GC<VM> {
        self.gc
    }

    /// Push a slot onto the private trace stack. A full stack is published to the shared task
    /// pool so idle collectors can take it.
    #[inline]
    pub fn push_slot(&mut self, slot: Slot) {
        let metadata = &self.gc.metadata;
        let stack = self
            .trace_stack
            .get_or_insert_with(|| metadata.free_task_buffer());
        if stack.is_full() {
            let full = std::mem::replace(stack, metadata.free_task_buffer());
            metadata.mark_task_pool.put(full);
        }
        stack.push(slot.encode());
    }

    /// Pop the next slot to trace, refilling the private stack from the shared pool when it
    /// runs dry. Returns `None` when no work is available right now.
    #[inline]
    pub fn pop_slot(&mut self) -> Option<Slot> {
        if let Some(word) = self.trace_stack.as_mut().and_then(|s| s.pop()) {
            return Some(Slot::decode(word));
        }
        let metadata = &self.gc.metadata;
        let mut shared = metadata.mark_task_pool.get()?;
        let word = shared.pop();
        if let Some(empty) = self.trace_stack.replace(shared) {
            metadata.put_free_task_buffer(empty);
        }
        word.map(Slot::decode)
    }

    /// Remember a slot outside the nursery that refers to an object left in the nursery.
    pub fn remember(&mut self, slot: Slot) {
        let metadata = &self.gc.metadata;
        let remset = self
            .remset
            .get_or_insert_with(|| metadata.free_set_buffer());
        if remset.is_full() {
            let full = std::mem::replace(remset, metadata.free_set_buffer());
            metadata.collector_remset_pool.put(full);
        }
        remset.push(slot.encode());
    }

    /// Record a reference object found by the trace.
    pub fn record_reference(&mut self, kind: ReferenceKind, reference: ObjectReference) {
        let metadata = &self.gc.metadata;
        let pool = self.gc.finref.reference_pool(kind);
        let buffer = self.references[kind].get_or_insert_with(|| metadata.free_set_buffer());
        if buffer.is_full() {
            let full = std::mem::replace(buffer, metadata.free_set_buffer());
            pool.put(full);
        }
        buffer.push(reference.to_raw_address().as_usize());
    }

    /// Publish everything held locally at the end of a phase.
    pub fn flush(&mut self) {
        let gc = self.gc;
        let metadata = &gc.metadata;
        if let Some(stack) = self.trace_stack.take() {
            debug_assert!(stack.is_empty(), "trace stack not drained");
            metadata.put_free_task_buffer(stack);
        }
        if let Some(remset) = self.remset.take() {
            metadata.put_set_buffer_into(&metadata.collector_remset_pool, remset);
        }
        for (kind, buffer) in self.references.iter_mut() {
            if let Some(b) = buffer.take() {
                metadata.put_set_buffer_into(gc.finref.reference_pool(kind), b);
            }
        }
        gc.stats.add_objects_traced(std::mem::take(&mut self.objects_traced));
        gc.stats
            .add_bytes_promoted(std::mem::take(&mut self.bytes_copied));
    }

    /// Drop local work after a failed phase.
    pub fn discard_local_work(&mut self) {
        if let Some(mut stack) = self.trace_stack.take() {
            stack.clear();
            self.gc.metadata.put_free_task_buffer(stack);
        }
    }
}
