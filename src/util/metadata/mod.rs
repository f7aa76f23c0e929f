//! The metadata pool manager.
//!
//! Collection bookkeeping (trace stacks, root sets, remembered sets, finalizer queues) lives in
//! fixed-size [`MetadataBuffer`]s. Buffers circulate between shared lock-free [`Pool`]s and the
//! threads that fill or drain them. Every buffer is created by [`GcMetadata`] and is always in
//! exactly one pool or owned by exactly one thread.

mod buffer;
mod gc_metadata;
mod pool;

pub use buffer::MetadataBuffer;
pub use gc_metadata::GcMetadata;
pub use pool::Pool;
