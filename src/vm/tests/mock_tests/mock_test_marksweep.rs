use super::mock_test_prelude::*;
use crate::plan::Plan;
use crate::policy::space::Space;
use crate::util::options::PlanSelector;
use std::collections::HashSet;

fn mark_sweep_fixture() -> GcFixture {
    GcFixture::create_with_builder(|builder| {
        builder.options.plan = PlanSelector::MarkSweep;
    })
}

fn node() -> &'static MockType {
    // 48 bytes: one link and three payload words.
    MockType::new("node", 1, 3)
}

fn chunks_of_list(fixture: &GcFixture, root: usize) -> HashSet<usize> {
    let mut chunks = HashSet::new();
    let mut cursor = get_root(root);
    while let Some(object) = cursor {
        chunks.insert(fixture.gc.heap().block_index(object.to_raw_address()));
        cursor = fixture.read(object, 0);
    }
    chunks
}

#[test]
pub fn live_objects_survive_and_garbage_is_swept() {
    with_mockvm(|| {
        let mut fixture = mark_sweep_fixture();
        assert_eq!(fixture.gc.plan.name(), "MarkSweep");
        assert!(!fixture.mark_sweep().is_concurrent());

        fixture.build_list(0, node(), 1000, AllocationSemantics::Default);
        let head = get_root(0).unwrap();
        let garbage = MockType::new("garbage", 0, 4);
        for _ in 0..20000 {
            fixture.alloc(garbage);
        }
        let used_before = fixture.mark_sweep().space().used_bytes();
        fixture.force_gc();

        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::MarkSweep), 1);
        assert_eq!(fixture.gc.runtime_state().collection_kind(), CollectionKind::MarkSweep);
        assert!(fixture.mark_sweep().space().used_bytes() < used_before);
        assert!(fixture.gc.stats.bytes_reclaimed() > 0);
        // The list is dense in its chunks, so it stays in place.
        assert_eq!(get_root(0), Some(head));
        fixture.check_list(0, 1000);
        fixture.verify();
    })
}

#[test]
pub fn exhausted_space_triggers_collections() {
    with_mockvm(|| {
        let mut fixture = mark_sweep_fixture();
        fixture.build_list(0, node(), 2000, AllocationSemantics::Default);
        let garbage = MockType::new("garbage", 0, 6);
        for round in 1..=3 {
            fixture.alloc_until_collection(garbage);
            assert_eq!(fixture.gc.stats.collections_of(CollectionKind::MarkSweep), round);
            fixture.check_list(0, 2000);
        }
        // Only garbage was allocated, so the heap never grew.
        assert_eq!(memory_manager::gc_total_memory(fixture.gc), 4 * BYTES_IN_MBYTE);
        fixture.verify();
    })
}

#[test]
pub fn sparse_chunks_are_compacted() {
    with_mockvm(|| {
        let mut fixture = mark_sweep_fixture();
        // Every live node is followed by fifteen dead objects of the same size class.
        let dead = MockType::new("dead", 0, 4);
        for i in (0..1000).rev() {
            let object = fixture.alloc(node());
            set_payload(object, 0, i);
            set_payload(object, 1, memory_manager::gc_get_hashcode(object) as usize);
            let next = get_root(0);
            fixture.write(object, 0, next);
            set_root(0, Some(object));
            for _ in 0..15 {
                fixture.alloc(dead);
            }
        }
        let chunks_before = chunks_of_list(&fixture, 0);
        let free_before = fixture.mark_sweep().space().num_free_chunks();
        fixture.force_gc();

        let chunks_after = chunks_of_list(&fixture, 0);
        assert!(chunks_after.len() < chunks_before.len());
        assert!(chunks_after.len() <= 3, "{} chunks after compaction", chunks_after.len());
        assert!(fixture.mark_sweep().space().num_free_chunks() >= free_before + 15);
        fixture.check_list(0, 1000);
        let mut cursor = get_root(0);
        while let Some(object) = cursor {
            assert_eq!(memory_manager::gc_get_hashcode(object) as usize, get_payload(object, 1));
            cursor = fixture.read(object, 0);
        }
        fixture.verify();
    })
}

#[test]
pub fn mostly_live_heap_grows() {
    with_mockvm(|| {
        let mut fixture = mark_sweep_fixture();
        let space_bytes = fixture.mark_sweep().space().committed_bytes();
        // 1 KB nodes, filling three quarters of the sweep space.
        let big = MockType::new("big node", 1, 125);
        let nodes = space_bytes * 3 / 4 / BYTES_IN_KBYTE;
        fixture.build_list(0, big, nodes, AllocationSemantics::Default);
        assert_eq!(fixture.gc.stats.collections(), 0);

        fixture.force_gc();
        assert_eq!(memory_manager::gc_total_memory(fixture.gc), 8 * BYTES_IN_MBYTE);
        assert!(fixture.mark_sweep().space().committed_bytes() > space_bytes);
        fixture.check_list(0, nodes);

        // The new chunks take allocation without another collection.
        fixture.build_list(1, big, 1000, AllocationSemantics::Default);
        assert_eq!(fixture.gc.stats.collections(), 1);
        fixture.check_list(1, 1000);
        fixture.verify();
    })
}

#[test]
pub fn large_objects_are_swept_in_place() {
    with_mockvm(|| {
        let mut fixture = mark_sweep_fixture();
        let large = MockType::new("large", 1, 2048);
        for i in 0..4 {
            let object = fixture.alloc(large);
            assert!(fixture.gc.heap().in_los(object.to_raw_address()));
            set_payload(object, 0, i);
            set_root(i, Some(object));
        }
        let kept = get_root(3).unwrap();
        for i in 0..3 {
            set_root(i, None);
        }
        fixture.force_gc();

        assert_eq!(fixture.gc.los().num_objects(), 1);
        assert_eq!(get_root(3), Some(kept));
        assert_eq!(get_payload(kept, 0), 3);
        fixture.verify();
    })
}

#[test]
pub fn fast_path_leaves_large_sizes_to_los() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.plan = PlanSelector::MarkSweep;
            builder.options.large_object_threshold = BYTES_IN_KBYTE;
        });
        // Both sizes share the 1024-byte size class, which the mutator now owns a chunk of.
        let small = MockType::sized("small", 1000);
        let at_threshold = MockType::sized("at threshold", BYTES_IN_KBYTE);
        let first = fixture.alloc(small);
        assert!(!fixture.gc.heap().in_los(first.to_raw_address()));
        assert!(memory_manager::gc_alloc_fast(fixture.mutator(), small.size, small.vtable()).is_some());

        assert!(memory_manager::gc_alloc_fast(fixture.mutator(), at_threshold.size, at_threshold.vtable()).is_none());
        let large = fixture.alloc(at_threshold);
        assert!(fixture.gc.heap().in_los(large.to_raw_address()));
    })
}
