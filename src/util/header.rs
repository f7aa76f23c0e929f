//! The object header protocol.
//!
//! Every object starts with two words:
//!
//! | offset | word        | contents                                                       |
//! |--------|-------------|----------------------------------------------------------------|
//! | 0      | vtable      | type descriptor address; bit 0 is the fallback mark bit       |
//! | 8      | object info | mark bits, forwarded bit, hash bits (or a forwarding pointer)  |
//!
//! The object-info word is the only word that collectors race on. Its layout is:
//!
//! * bits 0 and 1: the two mark bits. Only the bit selected by the current [`MarkParity`]
//!   means "marked"; the other one is a stale mark from the previous cycle.
//! * bit 2: forwarded. When set, the rest of the word (with the low three bits masked off)
//!   is the address of the copy.
//! * bit 3: hashed. When set, bits 8..32 hold the identity hash of the object.
//!
//! An object header is in exactly one of the [`HeaderState`]s. Transitions only go
//! `Unmarked -> Marked` and `Unmarked -> Forwarded` (or `Marked -> Forwarded` during
//! compaction) through compare-and-swap, so exactly one collector wins each transition.

use crate::util::constants::{OBJ_INFO_OFFSET, VTABLE_OFFSET};
use crate::util::{Address, ObjectReference};
use bytemuck::NoUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

const MARK_BIT_EVEN: usize = 0b0001;
const MARK_BIT_ODD: usize = 0b0010;
const MARK_BITS_MASK: usize = MARK_BIT_EVEN | MARK_BIT_ODD;
const FORWARDED_BIT: usize = 0b0100;
const HASHED_BIT: usize = 0b1000;
const FORWARDING_POINTER_MASK: usize = !0b0111;

const HASH_SHIFT: usize = 8;
const HASH_MASK: usize = 0x00ff_ffff;

/// The fallback mark bit lives in the vtable word.
const VT_MARK_BIT: usize = 0b1;

/// Which of the two header mark bits currently means "marked". Flipping the parity at the end
/// of a cycle makes every object unmarked again without touching the heap.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, NoUninit)]
pub enum MarkParity {
    Even = 0,
    Odd = 1,
}

impl MarkParity {
    pub fn flip(self) -> Self {
        match self {
            MarkParity::Even => MarkParity::Odd,
            MarkParity::Odd => MarkParity::Even,
        }
    }

    const fn bit(self) -> usize {
        match self {
            MarkParity::Even => MARK_BIT_EVEN,
            MarkParity::Odd => MARK_BIT_ODD,
        }
    }
}

/// The state of an object header under a given mark parity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeaderState {
    Unmarked,
    Marked,
    Forwarded(ObjectReference),
}

fn info_word(object: ObjectReference) -> &'static AtomicUsize {
    // Safety: every object reference handed to the header protocol points at a valid object
    // header inside the heap, and the object-info word is word aligned.
    unsafe { (object.to_raw_address() + OBJ_INFO_OFFSET).as_ref::<AtomicUsize>() }
}

fn vtable_word(object: ObjectReference) -> &'static AtomicUsize {
    unsafe { (object.to_raw_address() + VTABLE_OFFSET).as_ref::<AtomicUsize>() }
}

/// Write a fresh header for a newly allocated object.
pub fn initialize_header(object: ObjectReference, vtable: Address, mark: Option<MarkParity>) {
    debug_assert!(
        vtable.as_usize() & VT_MARK_BIT == 0,
        "vtable {} uses the low bit",
        vtable
    );
    vtable_word(object).store(vtable.as_usize(), Ordering::Relaxed);
    let info = mark.map_or(0, |p| p.bit());
    info_word(object).store(info, Ordering::Release);
}

/// The type descriptor of the object, with the fallback mark bit stripped.
pub fn vtable(object: ObjectReference) -> Address {
    let raw = vtable_word(object).load(Ordering::Relaxed);
    unsafe { Address::from_usize(raw & !VT_MARK_BIT) }
}

/// Load the raw object-info word.
pub fn load_info(object: ObjectReference) -> usize {
    info_word(object).load(Ordering::Acquire)
}

/// Store a raw object-info word. Only used by the single owner of an object, e.g. when
/// restoring a header after the object has been moved.
pub fn store_info(object: ObjectReference, info: usize) {
    info_word(object).store(info, Ordering::Release)
}

/// Decode a raw object-info word.
pub fn decode_state(info: usize, parity: MarkParity) -> HeaderState {
    if info & FORWARDED_BIT != 0 {
        let target = ObjectReference::from_word(info & FORWARDING_POINTER_MASK);
        debug_assert!(target.is_some(), "forwarded header without a target");
        match target {
            Some(target) => HeaderState::Forwarded(target),
            None => HeaderState::Unmarked,
        }
    } else if info & parity.bit() != 0 {
        HeaderState::Marked
    } else {
        HeaderState::Unmarked
    }
}

pub fn state(object: ObjectReference, parity: MarkParity) -> HeaderState {
    decode_state(load_info(object), parity)
}

pub fn is_marked(object: ObjectReference, parity: MarkParity) -> bool {
    let info = load_info(object);
    info & FORWARDED_BIT == 0 && info & parity.bit() != 0
}

/// Try to mark the object under `parity`. Returns true if this call performed the
/// `Unmarked -> Marked` transition, i.e. the caller must scan the object.
/// A stale mark of the other parity is cleared in the same step.
pub fn try_mark(object: ObjectReference, parity: MarkParity) -> bool {
    let word = info_word(object);
    let mut old = word.load(Ordering::Relaxed);
    loop {
        if old & FORWARDED_BIT != 0 || old & parity.bit() != 0 {
            return false;
        }
        let new = (old & !MARK_BITS_MASK) | parity.bit();
        match word.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return true,
            Err(current) => old = current,
        }
    }
}

/// Clear both mark bits, keeping the hash.
pub fn clear_marks(object: ObjectReference) {
    info_word(object).fetch_and(!MARK_BITS_MASK, Ordering::AcqRel);
}

/// Strip collector-private bits from an info word so it can be written into a copy.
pub fn strip_gc_bits(info: usize) -> usize {
    debug_assert!(info & FORWARDED_BIT == 0);
    info & !MARK_BITS_MASK
}

pub fn is_forwarded(object: ObjectReference) -> bool {
    load_info(object) & FORWARDED_BIT != 0
}

pub fn forwarding_target(object: ObjectReference) -> Option<ObjectReference> {
    let info = load_info(object);
    if info & FORWARDED_BIT != 0 {
        ObjectReference::from_word(info & FORWARDING_POINTER_MASK)
    } else {
        None
    }
}

/// Install a forwarding pointer if the header still holds `old_info`. On failure, returns the
/// current header word so the loser can find the winner's copy.
pub fn try_install_forwarding(
    object: ObjectReference,
    old_info: usize,
    target: ObjectReference,
) -> Result<(), usize> {
    debug_assert!(old_info & FORWARDED_BIT == 0);
    let new = target.to_raw_address().as_usize() | FORWARDED_BIT;
    info_word(object)
        .compare_exchange(old_info, new, Ordering::AcqRel, Ordering::Acquire)
        .map(|_| ())
}

/// Unconditionally forward an object. Used by compaction, where each object is owned by the
/// collector that claimed its block.
pub fn set_forwarding(object: ObjectReference, target: ObjectReference) {
    let new = target.to_raw_address().as_usize() | FORWARDED_BIT;
    info_word(object).store(new, Ordering::Release);
}

pub fn has_hash(info: usize) -> bool {
    info & FORWARDED_BIT == 0 && info & HASHED_BIT != 0
}

/// The identity hash of the object, attaching one on first request. The hash survives moves
/// because it travels with the object-info word.
pub fn identity_hash(object: ObjectReference) -> u32 {
    let word = info_word(object);
    let mut old = word.load(Ordering::Acquire);
    loop {
        debug_assert!(old & FORWARDED_BIT == 0, "hashing forwarded object {}", object);
        if old & HASHED_BIT != 0 {
            return ((old >> HASH_SHIFT) & HASH_MASK) as u32;
        }
        let hash = seed_hash(object);
        let new = (old & !(HASH_MASK << HASH_SHIFT)) | HASHED_BIT | (hash << HASH_SHIFT);
        match word.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return hash as u32,
            Err(current) => old = current,
        }
    }
}

/// The identity hash of the object if one has been attached.
pub fn hash(object: ObjectReference) -> Option<u32> {
    let info = load_info(object);
    has_hash(info).then(|| ((info >> HASH_SHIFT) & HASH_MASK) as u32)
}

fn seed_hash(object: ObjectReference) -> usize {
    let a = object.to_raw_address().as_usize() >> 3;
    let h = (a ^ (a >> 11) ^ (a >> 23)).wrapping_mul(0x9e37_79b9) & HASH_MASK;
    if h == 0 {
        1
    } else {
        h
    }
}

/// Set the fallback mark bit in the vtable word. Returns true if this call set it.
pub fn try_mark_in_vtable(object: ObjectReference) -> bool {
    let old = vtable_word(object).fetch_or(VT_MARK_BIT, Ordering::AcqRel);
    old & VT_MARK_BIT == 0
}

pub fn is_marked_in_vtable(object: ObjectReference) -> bool {
    vtable_word(object).load(Ordering::Acquire) & VT_MARK_BIT != 0
}

pub fn clear_vtable_mark(object: ObjectReference) {
    vtable_word(object).fetch_and(!VT_MARK_BIT, Ordering::AcqRel);
}
