//! Heap layout and the spaces that partition it.

pub mod block;
pub mod heap;
pub mod largeobjectspace;
pub mod mature;
pub mod nursery;
pub mod space;
pub mod sweepspace;
