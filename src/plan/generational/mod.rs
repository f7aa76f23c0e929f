//! The generational plan: a nursery (NOS) evacuated into a mature space (MOS) by minor
//! collections, and whole-heap mark-compact collections of MOS and NOS together with a swept
//! (or slid) large object space.
//!
//! A minor collection that cannot promote every survivor leaves the forwarded objects where
//! they are and hands over to a fallback collection, which marks in the vtable word and
//! slides everything.

mod compact;
mod fallback;
mod global;
mod minor;
mod space_tuner;

pub use self::global::GenCompact;
pub use self::space_tuner::{SpaceTuner, TuneKind, TUNING_GRANULARITY};
pub(crate) use self::compact::CompactLocal;
