//! The mark-sweep plan: a size-classed sweep space and LOS, collected by marking and sweeping
//! in place. Sparse chunks of one size class are compacted into denser ones at the end of a
//! stop-the-world cycle.
//!
//! With the `concurrent` option set, cycles are started by the collection scheduler and the
//! mark and the sweep run on the collectors while the mutators keep allocating, black, from
//! chunks the sweeper is not working on.

mod concurrent;
mod global;
mod mark;

pub use self::global::MarkSweep;
