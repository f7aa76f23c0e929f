// Not every test uses every helper.
#![allow(dead_code)]

use crate::memory_manager;
use crate::plan::generational::GenCompact;
use crate::plan::marksweep::MarkSweep;
use crate::util::constants::BYTES_IN_MBYTE;
use crate::util::test_util::mock_vm::{self, MockType, MockVM};
use crate::util::ObjectReference;
use crate::vm::Slot;
use crate::AllocationSemantics;
use crate::GCBuilder;
use crate::Mutator;
use crate::GC;

/// A GC instance bound to the mock VM, with one registered mutator. Dropping the fixture
/// detaches the mutator and wraps the instance up.
///
/// The mock VM keeps its roots in statics, so a test that creates a fixture should run inside
/// [`crate::util::test_util::serial_test`].
pub struct GcFixture {
    pub gc: &'static GC<MockVM>,
    mutator: Option<Box<Mutator<MockVM>>>,
}

impl GcFixture {
    /// A generational instance with a 4 MB heap that may grow to 16 MB.
    pub fn new() -> Self {
        Self::create_with_builder(|_| {})
    }

    pub fn create_with_builder<F>(with_builder: F) -> Self
    where
        F: FnOnce(&mut GCBuilder),
    {
        mock_vm::reset();
        let mut builder = GCBuilder::new_no_env_vars();
        builder.options.min_heap = 4 * BYTES_IN_MBYTE;
        builder.options.max_heap = 16 * BYTES_IN_MBYTE;
        builder.options.nursery_size = BYTES_IN_MBYTE;
        builder.options.threads = 2;
        with_builder(&mut builder);
        let gc = memory_manager::gc_init::<MockVM>(&builder);
        let mutator = memory_manager::gc_thread_init(gc);
        GcFixture {
            gc,
            mutator: Some(mutator),
        }
    }

    pub fn mutator(&mut self) -> &mut Mutator<MockVM> {
        self.mutator.as_mut().unwrap()
    }

    pub fn gen_compact(&self) -> &GenCompact<MockVM> {
        self.gc.plan.as_gen_compact().unwrap()
    }

    pub fn mark_sweep(&self) -> &MarkSweep<MockVM> {
        self.gc.plan.as_mark_sweep().unwrap()
    }

    pub fn alloc(&mut self, ty: &'static MockType) -> ObjectReference {
        self.alloc_with(ty, AllocationSemantics::Default)
    }

    pub fn alloc_with(&mut self, ty: &'static MockType, semantics: AllocationSemantics) -> ObjectReference {
        memory_manager::gc_alloc(self.mutator(), ty.size, ty.vtable(), semantics)
            .unwrap_or_else(|| panic!("failed to allocate a {}", ty.name))
    }

    /// Store `target` into reference field `i` of `src`, through the write barrier.
    pub fn write(&mut self, src: ObjectReference, i: usize, target: Option<ObjectReference>) {
        let slot = MockType::ref_slot(src, i);
        memory_manager::gc_heap_slot_write_ref(self.mutator(), src, slot, target);
    }

    pub fn read(&self, src: ObjectReference, i: usize) -> Option<ObjectReference> {
        Slot::Full(MockType::ref_slot(src, i)).load(self.gc.heap.start())
    }

    /// Build a singly linked list of `len` objects of `ty` held by root `root`. The first
    /// reference field is the link and the first payload word holds the node's position.
    pub fn build_list(&mut self, root: usize, ty: &'static MockType, len: usize, semantics: AllocationSemantics) {
        for i in (0..len).rev() {
            let node = self.alloc_with(ty, semantics);
            mock_vm::set_payload(node, 0, i);
            let next = mock_vm::get_root(root);
            self.write(node, 0, next);
            mock_vm::set_root(root, Some(node));
        }
    }

    /// Walk the list rooted at `root` and check that every node carries its position.
    pub fn check_list(&self, root: usize, len: usize) {
        let mut cursor = mock_vm::get_root(root);
        for i in 0..len {
            let node = cursor.unwrap_or_else(|| panic!("list {} ends at {} of {}", root, i, len));
            assert!(memory_manager::gc_is_heap_object(self.gc, node), "{} is not a heap object", node);
            assert_eq!(mock_vm::get_payload(node, 0), i);
            cursor = self.read(node, 0);
        }
        assert!(cursor.is_none());
    }

    /// Allocate unrooted objects of `ty` until a collection has happened. Returns the number of
    /// objects allocated.
    pub fn alloc_until_collection(&mut self, ty: &'static MockType) -> usize {
        let seen = self.gc.stats.collections();
        let mut n = 0;
        while self.gc.stats.collections() == seen {
            self.alloc(ty);
            n += 1;
            assert!(n < 1 << 22, "no collection after {} allocations", n);
        }
        n
    }

    pub fn force_gc(&mut self) {
        memory_manager::gc_force_gc(self.gc);
    }

    /// Verify the heap and return the number of reachable objects. Only call this while no
    /// collection is running.
    pub fn verify(&self) -> usize {
        crate::util::sanity::verify_heap(self.gc, false).unwrap_or_else(|e| panic!("{}", e))
    }

    /// Verify the heap including the remembered sets of the generational plan.
    pub fn verify_with_remsets(&mut self) -> usize {
        self.mutator().flush();
        crate::util::sanity::verify_heap(self.gc, true).unwrap_or_else(|e| panic!("{}", e))
    }

    /// Every metadata buffer is either free, queued for the runtime, or pooled. Only holds
    /// while no collection is running and the mutator has flushed.
    pub fn assert_buffers_conserved(&mut self) {
        self.mutator().flush();
        let gc = self.gc;
        assert_eq!(
            gc.metadata.total_buffers(),
            gc.metadata.pooled_buffers() + gc.finref.pooled_buffers(),
            "metadata buffers leaked"
        );
    }
}

impl Default for GcFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GcFixture {
    fn drop(&mut self) {
        if let Some(mutator) = self.mutator.take() {
            memory_manager::gc_thread_kill(mutator);
        }
        memory_manager::gc_wrapup(self.gc);
    }
}
