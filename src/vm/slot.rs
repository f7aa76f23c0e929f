use crate::util::constants::LOG_BYTES_IN_WORD;
use crate::util::{Address, ObjectReference};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// A location holding an object reference.
///
/// Slots in objects are always [`Slot::Full`]. Roots may also be [`Slot::Compressed`]: a 32-bit
/// word holding `((object - heap_base) >> 3) + 1`, or zero for null.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    Full(Address),
    Compressed(Address),
}

const COMPRESSED_TAG: usize = 0b1;

impl Slot {
    pub fn address(self) -> Address {
        match self {
            Slot::Full(a) | Slot::Compressed(a) => a,
        }
    }

    pub fn load(self, heap_base: Address) -> Option<ObjectReference> {
        match self {
            Slot::Full(a) => {
                ObjectReference::from_word(unsafe { a.atomic_load::<AtomicUsize>(Ordering::Relaxed) })
            }
            Slot::Compressed(a) => {
                let v = unsafe { a.atomic_load::<AtomicU32>(Ordering::Relaxed) };
                decompress(heap_base, v)
            }
        }
    }

    pub fn store(self, heap_base: Address, object: Option<ObjectReference>) {
        match self {
            Slot::Full(a) => unsafe {
                a.atomic_store::<AtomicUsize>(ObjectReference::to_word(object), Ordering::Relaxed)
            },
            Slot::Compressed(a) => unsafe {
                a.atomic_store::<AtomicU32>(compress(heap_base, object), Ordering::Relaxed)
            },
        }
    }

    /// Encode the slot as a metadata buffer entry.
    pub(crate) fn encode(self) -> usize {
        match self {
            Slot::Full(a) => {
                debug_assert!(a.is_aligned_to(2));
                a.as_usize()
            }
            Slot::Compressed(a) => {
                debug_assert!(a.is_aligned_to(2));
                a.as_usize() | COMPRESSED_TAG
            }
        }
    }

    pub(crate) fn decode(word: usize) -> Slot {
        let addr = unsafe { Address::from_usize(word & !COMPRESSED_TAG) };
        if word & COMPRESSED_TAG != 0 {
            Slot::Compressed(addr)
        } else {
            Slot::Full(addr)
        }
    }
}

/// Encode a reference as a compressed 32-bit word relative to `heap_base`.
pub fn compress(heap_base: Address, object: Option<ObjectReference>) -> u32 {
    match object {
        None => 0,
        Some(o) => {
            let offset = (o.to_raw_address() - heap_base) >> LOG_BYTES_IN_WORD;
            debug_assert!(offset < u32::MAX as usize);
            (offset + 1) as u32
        }
    }
}

pub fn decompress(heap_base: Address, word: u32) -> Option<ObjectReference> {
    if word == 0 {
        None
    } else {
        let addr = heap_base + (((word - 1) as usize) << LOG_BYTES_IN_WORD);
        ObjectReference::from_raw_address(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_round_trip_keeps_null() {
        let base = unsafe { Address::from_usize(0x1000_0000) };
        assert_eq!(compress(base, None), 0);
        let obj = ObjectReference::from_raw_address(base).unwrap();
        assert_eq!(compress(base, Some(obj)), 1);
        assert_eq!(decompress(base, 1), Some(obj));
        assert_eq!(decompress(base, 0), None);
    }

    #[test]
    fn slots_update_in_place() {
        let base = unsafe { Address::from_usize(0x1000_0000) };
        let obj = ObjectReference::from_raw_address(base + 0x40usize).unwrap();
        let mut full: usize = 0;
        let mut compressed: u32 = 0;
        let s1 = Slot::Full(Address::from_mut_ptr(&mut full));
        let s2 = Slot::Compressed(Address::from_mut_ptr(&mut compressed));
        s1.store(base, Some(obj));
        s2.store(base, Some(obj));
        assert_eq!(s1.load(base), Some(obj));
        assert_eq!(s2.load(base), Some(obj));
        assert_eq!(Slot::decode(s2.encode()), s2);
        assert_eq!(Slot::decode(s1.encode()), s1);
    }
}
