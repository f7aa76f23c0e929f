//! Finalizers and reference objects.
//!
//! Objects with a finalizer are registered when they are allocated. Reference objects are
//! discovered while tracing: instead of tracing the referent, the collector records the
//! reference in the pool of its strength. After the trace, [`FinrefMetadata::process`] walks
//! the pools:
//!
//! 1. soft references (full-heap collections only; minor collections trace them strongly),
//! 2. weak references,
//! 3. finalizable objects: dead ones are moved to the finalizable queue and resurrected by
//!    one more trace, so everything they reach survives until the runtime has run the
//!    finalizer,
//! 4. soft and weak references found by that trace, then phantom references.
//!
//! A reference whose referent died has its referent cleared and is put on the enqueued
//! reference queue. Both runtime-visible queues are roots of every collection until the
//! runtime takes their entries out.

use crate::util::metadata::{GcMetadata, MetadataBuffer, Pool};
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, ReferenceKind, Slot, VMBinding};
use enum_map::EnumMap;

/// Where a possibly dead object is after the trace: `Some` with its current address if it
/// survived, `None` if it is dead.
pub(crate) type Resolve<'a> = &'a dyn Fn(ObjectReference) -> Option<ObjectReference>;

pub struct FinrefMetadata {
    /// Objects with a finalizer that were alive at the last collection.
    pub(crate) finobj_pool: Pool,
    references: EnumMap<ReferenceKind, Pool>,
    /// Dead objects waiting for the runtime to run their finalizer.
    pub(crate) finalizable_obj_pool: Pool,
    /// References whose referent was cleared, waiting for the runtime.
    pub(crate) ref_enqueue_pool: Pool,
    /// Registrations since the last collection.
    registering: spin::Mutex<Option<Box<MetadataBuffer>>>,
}

impl Default for FinrefMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl FinrefMetadata {
    pub fn new() -> Self {
        FinrefMetadata {
            finobj_pool: Pool::new(),
            references: EnumMap::default(),
            finalizable_obj_pool: Pool::new(),
            ref_enqueue_pool: Pool::new(),
            registering: spin::Mutex::new(None),
        }
    }

    pub fn reference_pool(&self, kind: ReferenceKind) -> &Pool {
        &self.references[kind]
    }

    /// Track a newly allocated object that has a finalizer.
    pub fn register_finalizable(&self, metadata: &GcMetadata, object: ObjectReference) {
        let mut current = self.registering.lock();
        let buffer = current.get_or_insert_with(|| metadata.free_set_buffer());
        if buffer.is_full() {
            let full = std::mem::replace(buffer, metadata.free_set_buffer());
            self.finobj_pool.put(full);
        }
        buffer.push(object.to_raw_address().as_usize());
    }

    /// Move pending registrations into the pool. Called at the start of a collection.
    pub fn flush_registrations(&self, metadata: &GcMetadata) {
        if let Some(b) = self.registering.lock().take() {
            metadata.put_set_buffer_into(&self.finobj_pool, b);
        }
    }

    pub fn num_registered(&self) -> usize {
        self.finobj_pool.num_entries() + self.registering.lock().as_ref().map_or(0, |b| b.len())
    }

    pub fn num_finalizable(&self) -> usize {
        self.finalizable_obj_pool.num_entries()
    }

    pub fn num_enqueued(&self) -> usize {
        self.ref_enqueue_pool.num_entries()
    }

    /// Put every entry of the runtime-visible queues on the trace as a root. Entries are
    /// traced in place, so a moved object is updated in its queue.
    pub fn push_queue_roots(&self, metadata: &GcMetadata) {
        let mut task = metadata.free_task_buffer();
        self.for_each_queue_slot(|slot| {
            if task.is_full() {
                let full = std::mem::replace(&mut task, metadata.free_task_buffer());
                metadata.mark_task_pool.put(full);
            }
            task.push(slot.encode());
        });
        if task.is_empty() {
            metadata.put_free_task_buffer(task);
        } else {
            metadata.mark_task_pool.put(task);
        }
    }

    pub(crate) fn for_each_queue_slot(&self, f: impl FnMut(Slot)) {
        for_each_entry_slot(&[&self.finalizable_obj_pool, &self.ref_enqueue_pool], f)
    }

    /// Visit every entry that refers to a live object, as a slot. Used to fix the entries
    /// after objects have moved.
    pub fn for_each_live_slot(&self, f: impl FnMut(Slot)) {
        for_each_entry_slot(
            &[
                &self.finobj_pool,
                &self.finalizable_obj_pool,
                &self.ref_enqueue_pool,
            ],
            f,
        )
    }

    /// Process the references and finalizable objects found by the trace that just finished.
    ///
    /// `resolve` tells where an object is after the trace. `resurrect` runs a trace of the
    /// slots pushed onto the mark task pool. Returns true if objects became finalizable.
    pub(crate) fn process<VM: VMBinding>(
        &self,
        metadata: &GcMetadata,
        heap_base: Address,
        full_heap: bool,
        resolve: Resolve,
        resurrect: &dyn Fn(),
    ) -> bool {
        self.flush_registrations(metadata);
        let clear_soft = full_heap;
        if clear_soft {
            self.process_references::<VM>(metadata, heap_base, ReferenceKind::Soft, resolve);
        }
        self.process_references::<VM>(metadata, heap_base, ReferenceKind::Weak, resolve);

        let found = self.identify_finalizable(metadata, resolve);
        if found > 0 {
            debug!("{} objects are ready for finalization", found);
            resurrect();
            // The resurrection trace may have discovered more references.
            if clear_soft {
                self.process_references::<VM>(metadata, heap_base, ReferenceKind::Soft, resolve);
            }
            self.process_references::<VM>(metadata, heap_base, ReferenceKind::Weak, resolve);
        }
        self.process_references::<VM>(metadata, heap_base, ReferenceKind::Phantom, resolve);
        // Soft references kept alive by a minor collection are simply forgotten; they are
        // discovered again by the next trace.
        metadata.clear_set_pool(self.reference_pool(ReferenceKind::Soft));
        found > 0
    }

    fn process_references<VM: VMBinding>(
        &self,
        metadata: &GcMetadata,
        heap_base: Address,
        kind: ReferenceKind,
        resolve: Resolve,
    ) {
        let mut cleared = 0;
        let mut enqueue = None;
        for buffer in self.reference_pool(kind).drain() {
            for word in buffer.iter() {
                let Some(reference) = ObjectReference::from_word(word) else {
                    continue;
                };
                let slot = Slot::Full(VM::VMObjectModel::referent_slot(reference));
                let Some(referent) = slot.load(heap_base) else {
                    continue;
                };
                match resolve(referent) {
                    Some(new) => {
                        if new != referent {
                            slot.store(heap_base, Some(new));
                        }
                    }
                    None => {
                        slot.store(heap_base, None);
                        cleared += 1;
                        push_entry(metadata, &self.ref_enqueue_pool, &mut enqueue, reference);
                    }
                }
            }
            metadata.put_free_set_buffer(buffer);
        }
        if let Some(b) = enqueue {
            metadata.put_set_buffer_into(&self.ref_enqueue_pool, b);
        }
        if cleared > 0 {
            debug!("Cleared {} {:?} references", cleared, kind);
        }
    }

    /// Move dead finalizable objects to the finalizable queue and push their queue entries
    /// onto the mark task pool. Returns how many were found.
    fn identify_finalizable(&self, metadata: &GcMetadata, resolve: Resolve) -> usize {
        let mut dead = vec![];
        let buffers = self.finobj_pool.drain();
        for mut buffer in buffers {
            buffer.retain(|word| match ObjectReference::from_word(*word) {
                None => false,
                Some(object) => match resolve(object) {
                    Some(_) => true,
                    None => {
                        dead.push(object);
                        false
                    }
                },
            });
            // Survivors are updated to their new address.
            for i in 0..buffer.len() {
                let object = ObjectReference::from_word(buffer.get(i));
                if let Some(new) = object.and_then(resolve) {
                    buffer.set(i, new.to_raw_address().as_usize());
                }
            }
            metadata.put_set_buffer_into(&self.finobj_pool, buffer);
        }
        if dead.is_empty() {
            return 0;
        }
        let mut task = metadata.free_task_buffer();
        for chunk in dead.chunks(MetadataBuffer::CAPACITY) {
            let mut queue = metadata.free_set_buffer();
            for object in chunk {
                queue.push(object.to_raw_address().as_usize());
            }
            // The buffer does not move when its box is handed to the pool, so the slots stay
            // valid while the entries sit in the queue.
            for i in 0..queue.len() {
                if task.is_full() {
                    let full = std::mem::replace(&mut task, metadata.free_task_buffer());
                    metadata.mark_task_pool.put(full);
                }
                task.push(Slot::Full(queue.slot_of(i)).encode());
            }
            self.finalizable_obj_pool.put(queue);
        }
        metadata.mark_task_pool.put(task);
        dead.len()
    }

    /// Forget the references recorded by an abandoned trace. They are found again by the
    /// trace that replaces it.
    pub(crate) fn discard_references(&self, metadata: &GcMetadata) {
        for pool in self.references.values() {
            metadata.clear_set_pool(pool);
        }
    }

    /// Take one object off the finalizable queue.
    pub fn pop_finalizable(&self, metadata: &GcMetadata) -> Option<ObjectReference> {
        pop_entry(metadata, &self.finalizable_obj_pool)
    }

    /// Take one reference off the enqueued reference queue.
    pub fn pop_enqueued(&self, metadata: &GcMetadata) -> Option<ObjectReference> {
        pop_entry(metadata, &self.ref_enqueue_pool)
    }

    /// Make every registered object finalizable regardless of reachability. Used when the
    /// runtime shuts down.
    pub fn finalize_all(&self, metadata: &GcMetadata) -> usize {
        self.flush_registrations(metadata);
        let mut moved = 0;
        for buffer in self.finobj_pool.drain() {
            moved += buffer.len();
            metadata.put_set_buffer_into(&self.finalizable_obj_pool, buffer);
        }
        moved
    }

    /// Give every buffer back to the metadata. Used at shutdown.
    pub fn release(&self, metadata: &GcMetadata) {
        self.flush_registrations(metadata);
        for pool in self.all_pools() {
            metadata.clear_set_pool(pool);
        }
    }

    pub fn pooled_buffers(&self) -> usize {
        self.all_pools().iter().map(|p| p.len()).sum::<usize>()
            + usize::from(self.registering.lock().is_some())
    }

    fn all_pools(&self) -> [&Pool; 6] {
        [
            &self.finobj_pool,
            &self.references[ReferenceKind::Soft],
            &self.references[ReferenceKind::Weak],
            &self.references[ReferenceKind::Phantom],
            &self.finalizable_obj_pool,
            &self.ref_enqueue_pool,
        ]
    }
}

fn push_entry(
    metadata: &GcMetadata,
    pool: &Pool,
    current: &mut Option<Box<MetadataBuffer>>,
    object: ObjectReference,
) {
    let buffer = current.get_or_insert_with(|| metadata.free_set_buffer());
    if buffer.is_full() {
        let full = std::mem::replace(buffer, metadata.free_set_buffer());
        pool.put(full);
    }
    buffer.push(object.to_raw_address().as_usize());
}

fn pop_entry(metadata: &GcMetadata, pool: &Pool) -> Option<ObjectReference> {
    while let Some(mut buffer) = pool.get() {
        let entry = buffer.pop();
        metadata.put_set_buffer_into(pool, buffer);
        if let Some(object) = entry.and_then(ObjectReference::from_word) {
            return Some(object);
        }
    }
    None
}

fn for_each_entry_slot(pools: &[&Pool], mut f: impl FnMut(Slot)) {
    for pool in pools {
        let buffers = pool.drain();
        for buffer in buffers.iter() {
            for i in 0..buffer.len() {
                if buffer.get(i) != 0 {
                    f(Slot::Full(buffer.slot_of(i)));
                }
            }
        }
        for buffer in buffers {
            pool.put(buffer);
        }
    }
}
