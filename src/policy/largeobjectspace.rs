use crate::policy::heap::HeapLayout;
use crate::policy::space::Space;
use crate::util::constants::MIN_OBJECT_ALIGNMENT;
use crate::util::conversions;
use crate::util::{Address, ObjectReference};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One planned move of a large object during LOS compaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LosMove {
    pub from: ObjectReference,
    pub to: ObjectReference,
    pub size: usize,
}

struct LosInner {
    /// Free areas in address order. Adjacent areas are always coalesced.
    free_areas: Vec<(Address, usize)>,
    /// Allocated objects and their sizes in address order.
    objects: BTreeMap<Address, usize>,
}

impl LosInner {
    fn insert_free_area(&mut self, start: Address, size: usize) {
        if size == 0 {
            return;
        }
        let pos = self.free_areas.partition_point(|(a, _)| *a < start);
        let mut start = start;
        let mut size = size;
        // Merge with the following area.
        if pos < self.free_areas.len() && start + size == self.free_areas[pos].0 {
            size += self.free_areas[pos].1;
            self.free_areas.remove(pos);
        }
        // Merge with the preceding area.
        if pos > 0 {
            let (prev_start, prev_size) = self.free_areas[pos - 1];
            if prev_start + prev_size == start {
                start = prev_start;
                size += prev_size;
                self.free_areas[pos - 1] = (start, size);
                return;
            }
        }
        self.free_areas.insert(pos, (start, size));
    }
}

/// The large object space: the bottom of the heap, managed as a first-fit list of free areas.
/// Objects at or above the large object threshold are allocated here and are only moved by a
/// sliding compaction of the whole space.
pub struct LargeObjectSpace {
    heap: Arc<HeapLayout>,
    inner: spin::Mutex<LosInner>,
    used: AtomicUsize,
    allocated_since_major: AtomicUsize,
    failed_request: AtomicUsize,
}

impl LargeObjectSpace {
    pub fn new(heap: Arc<HeapLayout>) -> Self {
        let start = heap.start();
        let size = heap.los_end() - start;
        LargeObjectSpace {
            heap,
            inner: spin::Mutex::new(LosInner {
                free_areas: vec![(start, size)],
                objects: BTreeMap::new(),
            }),
            used: AtomicUsize::new(0),
            allocated_since_major: AtomicUsize::new(0),
            failed_request: AtomicUsize::new(0),
        }
    }

    pub fn in_space(&self, addr: Address) -> bool {
        self.heap.in_los(addr)
    }

    /// Allocate `size` bytes from the first free area that fits. The memory is zeroed.
    /// Returns `None` and remembers the request if no free area is large enough.
    pub fn alloc(&self, size: usize) -> Option<Address> {
        let size = conversions::raw_align_up(size, MIN_OBJECT_ALIGNMENT);
        let mut inner = self.inner.lock();
        let pos = inner.free_areas.iter().position(|(_, s)| *s >= size);
        let Some(pos) = pos else {
            drop(inner);
            self.failed_request.fetch_max(size, Ordering::Relaxed);
            trace!("LOS cannot satisfy a request of {} bytes", size);
            return None;
        };
        let (start, area) = inner.free_areas[pos];
        if area == size {
            inner.free_areas.remove(pos);
        } else {
            inner.free_areas[pos] = (start + size, area - size);
        }
        inner.objects.insert(start, size);
        drop(inner);
        unsafe { start.zero(size) };
        self.used.fetch_add(size, Ordering::Relaxed);
        self.allocated_since_major.fetch_add(size, Ordering::Relaxed);
        Some(start)
    }

    /// The largest request that failed since the last major collection, or zero.
    pub fn failed_request(&self) -> usize {
        self.failed_request.load(Ordering::Relaxed)
    }

    pub fn allocated_since_major(&self) -> usize {
        self.allocated_since_major.load(Ordering::Relaxed)
    }

    /// Forget the allocation history. Called at the end of each major collection.
    pub fn reset_allocation_stats(&self) {
        self.failed_request.store(0, Ordering::Relaxed);
        self.allocated_since_major.store(0, Ordering::Relaxed);
    }

    pub fn total_free(&self) -> usize {
        self.inner.lock().free_areas.iter().map(|(_, s)| *s).sum()
    }

    pub fn largest_free_area(&self) -> usize {
        self.inner
            .lock()
            .free_areas
            .iter()
            .map(|(_, s)| *s)
            .max()
            .unwrap_or(0)
    }

    pub fn num_objects(&self) -> usize {
        self.inner.lock().objects.len()
    }

    pub fn contains_object(&self, object: ObjectReference) -> bool {
        self.inner
            .lock()
            .objects
            .contains_key(&object.to_raw_address())
    }

    /// A copy of the object list, in address order.
    pub fn objects(&self) -> Vec<(ObjectReference, usize)> {
        self.inner
            .lock()
            .objects
            .iter()
            .filter_map(|(a, s)| ObjectReference::from_raw_address(*a).map(|o| (o, *s)))
            .collect()
    }

    /// Free every object for which `is_live` returns false. Returns the bytes reclaimed.
    pub fn sweep(&self, mut is_live: impl FnMut(ObjectReference) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let dead: Vec<(Address, usize)> = inner
            .objects
            .iter()
            .filter(|(a, _)| {
                let object = unsafe { ObjectReference::from_raw_address_unchecked(**a) };
                !is_live(object)
            })
            .map(|(a, s)| (*a, *s))
            .collect();
        let mut reclaimed = 0;
        for (a, s) in dead {
            inner.objects.remove(&a);
            inner.insert_free_area(a, s);
            reclaimed += s;
        }
        drop(inner);
        self.used.fetch_sub(reclaimed, Ordering::Relaxed);
        reclaimed
    }

    /// Plan a sliding compaction of the live objects towards the bottom of the space. Dead
    /// objects are dropped from the object list. The moves are in address order and never
    /// move an object upwards.
    pub fn plan_slide(&self, mut is_live: impl FnMut(ObjectReference) -> bool) -> Vec<LosMove> {
        let inner = self.inner.lock();
        let mut cursor = self.heap.start();
        let mut moves = vec![];
        for (a, s) in inner.objects.iter() {
            let from = unsafe { ObjectReference::from_raw_address_unchecked(*a) };
            if !is_live(from) {
                continue;
            }
            let to = unsafe { ObjectReference::from_raw_address_unchecked(cursor) };
            moves.push(LosMove { from, to, size: *s });
            cursor += *s;
        }
        moves
    }

    /// The end of the live data once `moves` are applied.
    pub fn slide_end(&self, moves: &[LosMove]) -> Address {
        moves
            .last()
            .map_or(self.heap.start(), |m| m.to.to_raw_address() + m.size)
    }

    /// Carry out planned moves and rebuild the free list as one area above the live data,
    /// up to the current LOS end.
    pub fn apply_slide(&self, moves: &[LosMove]) {
        let mut inner = self.inner.lock();
        let mut objects = BTreeMap::new();
        let mut used = 0;
        for m in moves {
            debug_assert!(m.to <= m.from);
            if m.to != m.from {
                unsafe {
                    std::ptr::copy(
                        m.from.to_raw_address().to_ptr::<u8>(),
                        m.to.to_raw_address().to_mut_ptr::<u8>(),
                        m.size,
                    );
                }
            }
            objects.insert(m.to.to_raw_address(), m.size);
            used += m.size;
        }
        let end = self.slide_end(moves);
        inner.objects = objects;
        inner.free_areas.clear();
        let los_end = self.heap.los_end();
        inner.insert_free_area(end, los_end - end);
        self.used.store(used, Ordering::Relaxed);
    }

    /// The LOS end has moved up to `new_end`: add the new space as free.
    pub fn grow_to(&self, old_end: Address, new_end: Address) {
        debug_assert!(new_end > old_end);
        self.inner.lock().insert_free_area(old_end, new_end - old_end);
    }

    /// Give up `[new_end, old_end)`, which must be free. Returns false (and changes nothing)
    /// if an object lives there.
    pub fn shrink_to(&self, old_end: Address, new_end: Address) -> bool {
        let mut inner = self.inner.lock();
        let Some(&(start, size)) = inner.free_areas.last() else {
            return false;
        };
        if start + size != old_end || start > new_end {
            return false;
        }
        inner.free_areas.pop();
        inner.insert_free_area(start, new_end - start);
        true
    }

    /// The lowest address above which the LOS is free, i.e. how far it could shrink.
    pub fn free_top_start(&self, los_end: Address) -> Address {
        let inner = self.inner.lock();
        match inner.free_areas.last() {
            Some(&(start, size)) if start + size == los_end => start,
            _ => los_end,
        }
    }
}

impl Space for LargeObjectSpace {
    fn name(&self) -> &'static str {
        "los"
    }

    fn committed_bytes(&self) -> usize {
        self.heap.los_end() - self.heap.start()
    }

    fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }
}
