//! The collector pool and the policies that decide when to collect.
//!
//! A fixed number of collector threads is started when the GC is built. The thread that
//! drives a collection (a mutator thread that ran out of memory, or the thread that asked for
//! a collection) hands each phase to the pool as a task with
//! [`CollectorPool::run_task`]. Every collector runs the task once, and the driving thread
//! waits for all of them, so consecutive tasks are separated by a barrier. Work generated
//! inside a trace task is shared through [`crate::util::metadata::GcMetadata::mark_task_pool`]
//! and a [`TerminationBarrier`] decides when the trace is complete.

mod collection_scheduler;
mod collector;
mod collector_pool;
mod termination;

pub use self::collection_scheduler::CollectionSample;
pub use self::collection_scheduler::CollectionScheduler;
pub use self::collector::Collector;
pub use self::collector_pool::CollectorPool;
pub use self::termination::TerminationBarrier;
