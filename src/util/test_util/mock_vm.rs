//! A mock runtime for tests.
//!
//! Objects are described by [`MockType`]s: a fixed size, reference fields right after the two
//! header words, then payload words. A type can be a reference object (its first reference
//! field is the referent) and can ask for finalization. The vtable word of an object is the
//! address of its leaked `MockType`.
//!
//! Roots live in a fixed table of full-width slots and a smaller table of compressed slots.
//! The counters record how often gengc called back into the runtime.

use crate::memory_manager;
use crate::util::test_util::{serial_test, with_cleanup};
use crate::util::constants::{BYTES_IN_WORD, OBJECT_HEADER_BYTES};
use crate::util::header;
use crate::util::{Address, ObjectReference};
use crate::vm::{
    AllocationError, Collection, ObjectModel, ReferenceKind, RootSetBuilder, Scanning, Slot,
    VMBinding,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// The type descriptor of mock objects.
#[derive(Debug)]
pub struct MockType {
    pub name: &'static str,
    pub size: usize,
    pub num_refs: usize,
    pub reference_kind: Option<ReferenceKind>,
    pub finalizer: bool,
}

impl MockType {
    /// A leaked type with `num_refs` reference fields and `payload_words` payload words.
    pub fn new(name: &'static str, num_refs: usize, payload_words: usize) -> &'static MockType {
        Self::leak(MockType {
            name,
            size: OBJECT_HEADER_BYTES + (num_refs + payload_words) * BYTES_IN_WORD,
            num_refs,
            reference_kind: None,
            finalizer: false,
        })
    }

    /// A type of `size` bytes without reference fields.
    pub fn sized(name: &'static str, size: usize) -> &'static MockType {
        Self::leak(MockType {
            name,
            size: size.max(OBJECT_HEADER_BYTES + BYTES_IN_WORD),
            num_refs: 0,
            reference_kind: None,
            finalizer: false,
        })
    }

    /// A reference object type: one referent field and one payload word.
    pub fn reference(name: &'static str, kind: ReferenceKind) -> &'static MockType {
        Self::leak(MockType {
            name,
            size: OBJECT_HEADER_BYTES + 2 * BYTES_IN_WORD,
            num_refs: 1,
            reference_kind: Some(kind),
            finalizer: false,
        })
    }

    /// A type with a finalizer, one reference field and one payload word.
    pub fn finalizable(name: &'static str) -> &'static MockType {
        Self::leak(MockType {
            name,
            size: OBJECT_HEADER_BYTES + 2 * BYTES_IN_WORD,
            num_refs: 1,
            reference_kind: None,
            finalizer: true,
        })
    }

    fn leak(ty: MockType) -> &'static MockType {
        Box::leak(Box::new(ty))
    }

    pub fn vtable(&'static self) -> Address {
        Address::from_ref(self)
    }

    pub fn of(object: ObjectReference) -> &'static MockType {
        unsafe { header::vtable(object).as_ref::<MockType>() }
    }

    pub fn ref_slot(object: ObjectReference, i: usize) -> Address {
        debug_assert!(i < Self::of(object).num_refs);
        object.to_raw_address() + OBJECT_HEADER_BYTES + i * BYTES_IN_WORD
    }

    fn payload_slot(object: ObjectReference, i: usize) -> Address {
        let ty = Self::of(object);
        let addr = object.to_raw_address() + OBJECT_HEADER_BYTES + (ty.num_refs + i) * BYTES_IN_WORD;
        debug_assert!(addr + BYTES_IN_WORD <= object.to_raw_address() + ty.size);
        addr
    }
}

/// Read reference field `i` of `object`.
pub fn get_ref(object: ObjectReference, i: usize) -> Option<ObjectReference> {
    Slot::Full(MockType::ref_slot(object, i)).load(Address::ZERO)
}

/// Read payload word `i` of `object`.
pub fn get_payload(object: ObjectReference, i: usize) -> usize {
    unsafe { MockType::payload_slot(object, i).load::<usize>() }
}

/// Write payload word `i` of `object`. Payload is not seen by the collector.
pub fn set_payload(object: ObjectReference, i: usize, value: usize) {
    unsafe { MockType::payload_slot(object, i).store::<usize>(value) }
}

pub const MAX_ROOTS: usize = 256;
pub const MAX_COMPRESSED_ROOTS: usize = 16;

static ROOTS: [AtomicUsize; MAX_ROOTS] = [const { AtomicUsize::new(0) }; MAX_ROOTS];
static COMPRESSED_ROOTS: [AtomicU32; MAX_COMPRESSED_ROOTS] =
    [const { AtomicU32::new(0) }; MAX_COMPRESSED_ROOTS];

pub static STOP_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static RESUME_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static OOM_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static FINALIZATION_CALLS: AtomicUsize = AtomicUsize::new(0);

pub fn root_slot(i: usize) -> Address {
    Address::from_ref(&ROOTS[i])
}

pub fn get_root(i: usize) -> Option<ObjectReference> {
    ObjectReference::from_word(ROOTS[i].load(Ordering::SeqCst))
}

pub fn set_root(i: usize, object: Option<ObjectReference>) {
    ROOTS[i].store(ObjectReference::to_word(object), Ordering::SeqCst);
}

pub fn compressed_root_slot(i: usize) -> Address {
    Address::from_ref(&COMPRESSED_ROOTS[i])
}

pub fn get_compressed_root(heap_base: Address, i: usize) -> Option<ObjectReference> {
    Slot::Compressed(compressed_root_slot(i)).load(heap_base)
}

pub fn set_compressed_root(heap_base: Address, i: usize, object: Option<ObjectReference>) {
    Slot::Compressed(compressed_root_slot(i)).store(heap_base, object);
}

/// Clear every root and counter.
pub fn reset() {
    for r in ROOTS.iter() {
        r.store(0, Ordering::SeqCst);
    }
    for r in COMPRESSED_ROOTS.iter() {
        r.store(0, Ordering::SeqCst);
    }
    for c in [&STOP_CALLS, &RESUME_CALLS, &OOM_CALLS, &FINALIZATION_CALLS] {
        c.store(0, Ordering::SeqCst);
    }
}

/// Run a test that uses the mock VM. Such tests share the root table and counters, so they run
/// one at a time, and the mock state is cleared afterwards even if the test fails.
pub fn with_mockvm<T>(test: T)
where
    T: FnOnce() + std::panic::UnwindSafe,
{
    serial_test(|| with_cleanup(test, reset))
}

#[derive(Default)]
pub struct MockVM;

impl VMBinding for MockVM {
    type VMObjectModel = MockVM;
    type VMScanning = MockVM;
    type VMCollection = MockVM;
}

impl ObjectModel<MockVM> for MockVM {
    fn get_current_size(object: ObjectReference) -> usize {
        MockType::of(object).size
    }

    fn scan_object<F: FnMut(Address)>(object: ObjectReference, slot_visitor: &mut F) {
        for i in 0..MockType::of(object).num_refs {
            slot_visitor(MockType::ref_slot(object, i));
        }
    }

    fn reference_kind(object: ObjectReference) -> Option<ReferenceKind> {
        MockType::of(object).reference_kind
    }

    fn referent_slot(object: ObjectReference) -> Address {
        MockType::ref_slot(object, 0)
    }

    fn has_finalizer(object: ObjectReference) -> bool {
        MockType::of(object).finalizer
    }
}

impl Scanning<MockVM> for MockVM {
    fn enumerate_roots(roots: &mut RootSetBuilder) {
        for i in 0..MAX_ROOTS {
            if ROOTS[i].load(Ordering::SeqCst) != 0 {
                memory_manager::gc_add_root_set_entry(roots, root_slot(i), false);
            }
        }
        for i in 0..MAX_COMPRESSED_ROOTS {
            if COMPRESSED_ROOTS[i].load(Ordering::SeqCst) != 0 {
                memory_manager::gc_add_compressed_root_set_entry(roots, compressed_root_slot(i));
            }
        }
    }
}

impl Collection<MockVM> for MockVM {
    fn stop_all_mutators() {
        STOP_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn resume_mutators() {
        RESUME_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn out_of_memory(err: AllocationError) {
        OOM_CALLS.fetch_add(1, Ordering::SeqCst);
        panic!("Out of memory with {:?}!", err);
    }

    fn schedule_finalization() {
        FINALIZATION_CALLS.fetch_add(1, Ordering::SeqCst);
    }
}
