use crate::policy::block::{BlockIndex, BlockTable};
use crate::util::constants::*;
use crate::util::conversions;
use crate::util::options::{Options, PlanSelector};
use crate::util::os;
use crate::util::Address;
use crate::vm::AllocationError;
use atomic::Atomic;
use std::sync::atomic::Ordering;

/// The heap is one reserved range. The committed part is partitioned, from the bottom:
///
/// ```text
/// start            los_end                 nos_start            committed_end   reserved_end
///   | LOS             | MOS (or sweep space)  | NOS                 | (reserved)     |
/// ```
///
/// The boundaries only move while mutators are stopped. `nos_start` equals `committed_end`
/// for the mark-sweep plan, which has no nursery.
pub struct HeapLayout {
    start: Address,
    reserved_end: Address,
    committed_end: Atomic<Address>,
    los_end: Atomic<Address>,
    nos_start: Atomic<Address>,
    pub blocks: BlockTable,
}

impl HeapLayout {
    /// Reserve and commit the heap. Reservation starts at `max_heap` and halves until it
    /// succeeds or drops below `min_heap`.
    pub fn new(options: &Options) -> Result<Self, AllocationError> {
        let min_heap = conversions::raw_align_up(options.min_heap, BYTES_IN_BLOCK);
        let mut reserve = conversions::raw_align_up(options.max_heap, BYTES_IN_BLOCK).max(min_heap);
        let start = loop {
            match os::reserve(reserve, BYTES_IN_BLOCK) {
                Ok(start) => break start,
                Err(e) => {
                    warn!("Failed to reserve {} bytes for the heap: {}", reserve, e);
                    let halved = conversions::raw_align_down(reserve / 2, BYTES_IN_BLOCK);
                    if halved < min_heap {
                        error!("Cannot reserve even the minimum heap of {} bytes", min_heap);
                        return Err(AllocationError::MmapOutOfMemory);
                    }
                    reserve = halved;
                }
            }
        };
        if let Err(e) = os::commit(start, min_heap) {
            error!("Failed to commit {} bytes of heap: {}", min_heap, e);
            let _ = os::release(start, reserve);
            return Err(AllocationError::MmapOutOfMemory);
        }
        let committed_end = start + min_heap;

        let los_bytes = conversions::raw_align_up(
            ((min_heap as f64) * options.los_ratio) as usize,
            BYTES_IN_BLOCK,
        )
        .max(BYTES_IN_BLOCK);
        let los_end = start + los_bytes;
        let nos_start = match options.plan {
            PlanSelector::GenCompact => {
                let rest = committed_end - los_end;
                let nos = conversions::raw_align_down(options.nursery_size.min(rest / 2), BYTES_IN_BLOCK)
                    .max(BYTES_IN_BLOCK);
                committed_end - nos
            }
            PlanSelector::MarkSweep => committed_end,
        };
        debug_assert!(los_end < nos_start || options.plan == PlanSelector::MarkSweep);

        info!(
            "Heap reserved at {}..{} ({} committed): LOS {}, MOS {}, NOS {}",
            start,
            start + reserve,
            conversions::bytes_to_formatted_string(min_heap),
            conversions::bytes_to_formatted_string(los_end - start),
            conversions::bytes_to_formatted_string(nos_start - los_end),
            conversions::bytes_to_formatted_string(committed_end - nos_start),
        );

        Ok(HeapLayout {
            start,
            reserved_end: start + reserve,
            committed_end: Atomic::new(committed_end),
            los_end: Atomic::new(los_end),
            nos_start: Atomic::new(nos_start),
            blocks: BlockTable::new(start, conversions::bytes_to_blocks(reserve)),
        })
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn reserved_end(&self) -> Address {
        self.reserved_end
    }

    pub fn committed_end(&self) -> Address {
        self.committed_end.load(Ordering::Acquire)
    }

    pub fn los_end(&self) -> Address {
        self.los_end.load(Ordering::Acquire)
    }

    pub fn nos_start(&self) -> Address {
        self.nos_start.load(Ordering::Acquire)
    }

    pub fn set_los_end(&self, addr: Address) {
        debug_assert!(addr.is_aligned_to(BYTES_IN_BLOCK));
        debug_assert!(addr > self.start && addr <= self.nos_start());
        self.los_end.store(addr, Ordering::Release)
    }

    pub fn set_nos_start(&self, addr: Address) {
        debug_assert!(addr.is_aligned_to(BYTES_IN_BLOCK));
        debug_assert!(addr >= self.los_end() && addr <= self.committed_end());
        self.nos_start.store(addr, Ordering::Release)
    }

    pub fn committed_bytes(&self) -> usize {
        self.committed_end() - self.start
    }

    pub fn in_heap(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.committed_end()
    }

    pub fn in_los(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.los_end()
    }

    /// In MOS for the generational plan, in the sweep space for the mark-sweep plan.
    pub fn in_mos(&self, addr: Address) -> bool {
        addr >= self.los_end() && addr < self.nos_start()
    }

    #[inline(always)]
    pub fn in_nos(&self, addr: Address) -> bool {
        addr >= self.nos_start() && addr < self.committed_end()
    }

    pub fn block_index(&self, addr: Address) -> BlockIndex {
        self.blocks.index_of(addr)
    }

    pub fn los_end_block(&self) -> BlockIndex {
        self.blocks.index_of(self.los_end())
    }

    pub fn nos_start_block(&self) -> BlockIndex {
        self.blocks.index_of(self.nos_start())
    }

    pub fn committed_end_block(&self) -> BlockIndex {
        self.blocks.index_of(self.committed_end())
    }

    /// Commit up to `bytes` more at the top of the heap. Returns the number of bytes added,
    /// which is zero once the reservation is exhausted.
    pub fn grow(&self, bytes: usize) -> usize {
        let end = self.committed_end();
        let bytes = conversions::raw_align_down(bytes.min(self.reserved_end - end), BYTES_IN_BLOCK);
        if bytes == 0 {
            return 0;
        }
        match os::commit(end, bytes) {
            Ok(()) => {
                self.committed_end.store(end + bytes, Ordering::Release);
                debug!(
                    "Heap grown by {} to {}",
                    conversions::bytes_to_formatted_string(bytes),
                    conversions::bytes_to_formatted_string(self.committed_bytes())
                );
                bytes
            }
            Err(e) => {
                warn!("Failed to grow the heap by {} bytes: {}", bytes, e);
                0
            }
        }
    }
}
