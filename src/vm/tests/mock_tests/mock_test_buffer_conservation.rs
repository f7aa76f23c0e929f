use super::mock_test_prelude::*;
use crate::util::options::{ConcurrentAlgorithm, PlanSelector};

/// Old-to-young pointers, reference objects and finalizable objects, so that every kind of
/// metadata buffer gets used.
fn populate(fixture: &mut GcFixture) {
    let node = MockType::new("node", 1, 1);
    fixture.build_list(0, node, 300, AllocationSemantics::Mature);
    let old = get_root(0).unwrap();
    let young = fixture.alloc(node);
    fixture.write(old, 0, Some(young));
    set_payload(young, 0, 1000);
    for i in 0..20 {
        let weak = fixture.alloc(MockType::reference("weak", ReferenceKind::Weak));
        set_root(10 + i, Some(weak));
        let referent = fixture.alloc(node);
        fixture.write(weak, 0, Some(referent));
        fixture.alloc(MockType::finalizable("finalizable"));
    }
}

#[test]
pub fn buffers_are_conserved_across_collections() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let total = fixture.gc.metadata.total_buffers();
        fixture.assert_buffers_conserved();

        populate(&mut fixture);
        fixture.assert_buffers_conserved();

        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Minor), 1);
        fixture.assert_buffers_conserved();

        fixture.force_gc();
        fixture.assert_buffers_conserved();

        // Taking entries from the queues hands their buffers back.
        while memory_manager::gc_get_enqueued_reference(fixture.gc).is_some() {}
        while memory_manager::gc_get_finalizable_object(fixture.gc).is_some() {}
        fixture.assert_buffers_conserved();
        fixture.force_gc();
        fixture.assert_buffers_conserved();
        assert!(fixture.gc.metadata.total_buffers() >= total);
    })
}

#[test]
pub fn buffers_are_conserved_by_concurrent_cycles() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.plan = PlanSelector::MarkSweep;
            builder.options.concurrent = ConcurrentAlgorithm::Satb;
        });
        populate(&mut fixture);
        let garbage = MockType::new("garbage", 0, 4);
        while fixture.gc.stats.collections() < 2 {
            fixture.alloc(garbage);
        }
        // A forced collection completes the cycle in progress.
        fixture.force_gc();
        fixture.assert_buffers_conserved();
        assert!(fixture.gc.metadata.check_results_empty());
    })
}
