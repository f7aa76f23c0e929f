use crate::util::constants::METADATA_BUFFER_ENTRIES;
use crate::util::Address;

/// A fixed-capacity buffer of words. It is used both as a vector (appended to until full, then
/// handed to a pool) and as a stack (a collector's private trace stack).
///
/// The backing storage never reallocates, so [`MetadataBuffer::slot_of`] gives a stable address
/// for an entry. Pools of object references use this to let the tracer update entries in place,
/// exactly like a slot in the heap.
pub struct MetadataBuffer {
    entries: Vec<usize>,
}

impl MetadataBuffer {
    pub const CAPACITY: usize = METADATA_BUFFER_ENTRIES;

    pub fn new() -> Self {
        MetadataBuffer {
            entries: Vec::with_capacity(Self::CAPACITY),
        }
    }

    /// Append an entry. Returns false without appending if the buffer is full.
    #[inline(always)]
    pub fn push(&mut self, word: usize) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(word);
        true
    }

    #[inline(always)]
    pub fn pop(&mut self) -> Option<usize> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == Self::CAPACITY
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, index: usize) -> usize {
        self.entries[index]
    }

    pub fn set(&mut self, index: usize, word: usize) {
        self.entries[index] = word;
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().copied()
    }

    /// Remove every entry for which `keep` returns false.
    pub fn retain(&mut self, keep: impl FnMut(&usize) -> bool) {
        self.entries.retain(keep);
    }

    /// The address of entry `index`, which stays valid while the buffer is alive.
    pub fn slot_of(&self, index: usize) -> Address {
        debug_assert!(index < self.entries.len());
        Address::from_ref(&self.entries[index])
    }
}

impl Default for MetadataBuffer {
    fn default() -> Self {
        Self::new()
    }
}
