// Tests with the prefix 'mock_test_' bind gengc to the mock VM in
// `crate::util::test_util::mock_vm`. Every test creates its own GC instance through
// `GcFixture` and runs inside `with_mockvm`, because the mock VM keeps its roots in statics.
//
// Objects move in most collections. A test must not keep an `ObjectReference` in a local across
// an allocation or a collection; it should keep it in a mock root and read the root again.

// Common includes for mock tests.
pub(crate) mod mock_test_prelude {
    pub use crate::memory_manager;
    pub use crate::plan::{AllocationSemantics, CollectionKind};
    pub use crate::util::constants::*;
    pub use crate::util::test_util::fixtures::*;
    pub use crate::util::test_util::mock_vm::*;
    pub use crate::util::{Address, ObjectReference};
    pub use crate::vm::*;
}

mod mock_test_allocate;
mod mock_test_buffer_conservation;
mod mock_test_compressed_roots;
mod mock_test_concurrent_marksweep;
mod mock_test_fallback_gc;
mod mock_test_finalizer;
mod mock_test_major_gc;
mod mock_test_marksweep;
mod mock_test_minor_gc;
mod mock_test_options;
mod mock_test_random_graph;
mod mock_test_reference_types;
mod mock_test_space_tuner;
