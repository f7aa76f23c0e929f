//! gengc is a heap manager and garbage collector for managed-language runtimes.
//!
//! The heap is a single reserved address range. It is split into a large-object
//! space (LOS) at the bottom and, above it, either a mature space (MOS) and a
//! nursery (NOS) for the generational plan, or a size-classed sweep space for
//! the mark-sweep plan. Collections are carried out by a pool of collector
//! threads that share work through lock-free pools of metadata buffers.
//!
//! A language runtime binds to gengc by implementing [`vm::VMBinding`] and then
//! drives it through the functions in [`memory_manager`]:
//!
//! * [`memory_manager::gc_init`] reserves the heap and starts the collectors,
//! * [`memory_manager::gc_thread_init`] registers a mutator thread,
//! * [`memory_manager::gc_alloc`] allocates objects,
//! * the `gc_heap_*` functions are the write barrier,
//! * [`memory_manager::gc_force_gc`] requests a full collection.

extern crate libc;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

pub mod build_info;
mod gc;
pub use gc::GCBuilder;
pub use gc::GC;

pub mod memory_manager;
pub mod plan;
pub mod policy;
pub mod scheduler;
pub mod util;
pub mod vm;

pub use crate::plan::{AllocationSemantics, Mutator};
