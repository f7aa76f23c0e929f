use super::mock_test_prelude::*;

// With the fixture's 4 MB heap, LOS takes 13 blocks, NOS 32 blocks and MOS 83 blocks.
const NODE_WORDS: usize = 125;
const MOS_NODES: usize = 2200;

fn big_node() -> &'static MockType {
    // 1 KB: the header, one link and 125 payload words.
    MockType::new("big node", 1, NODE_WORDS)
}

/// Fill about 69 of the 83 MOS blocks with a live list held by root 0.
fn fill_mos(fixture: &mut GcFixture) {
    fixture.build_list(0, big_node(), MOS_NODES, AllocationSemantics::Mature);
    assert_eq!(fixture.gc.stats.collections(), 0);
}

#[test]
pub fn failed_promotion_falls_back_to_full_heap() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        fill_mos(&mut fixture);
        // More live nursery data than MOS has room for.
        fixture.build_list(1, big_node(), 1000, AllocationSemantics::Default);
        assert_eq!(fixture.gc.stats.collections(), 0);

        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        let stats = &fixture.gc.stats;
        assert_eq!(stats.collections(), 1);
        assert_eq!(stats.collections_of(CollectionKind::Fallback), 1);
        assert_eq!(fixture.gc.runtime_state().collection_kind(), CollectionKind::Fallback);

        fixture.check_list(0, MOS_NODES);
        fixture.check_list(1, 1000);
        fixture.verify_with_remsets();
        // Live data filled most of MOS and NOS, so the heap grew.
        assert!(memory_manager::gc_total_memory(fixture.gc) > 4 * BYTES_IN_MBYTE);
        assert!(!fixture.gc.runtime_state().next_gc_full());
    })
}

#[test]
pub fn full_mos_makes_the_next_collection_major() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        fill_mos(&mut fixture);
        fixture.build_list(1, big_node(), 100, AllocationSemantics::Default);

        let garbage = MockType::new("garbage", 0, 4);
        fixture.alloc_until_collection(garbage);
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Minor), 1);
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Fallback), 0);
        // Fewer free MOS blocks than NOS blocks remain.
        assert!(fixture.gc.runtime_state().next_gc_full());

        fixture.alloc_until_collection(garbage);
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Major), 1);
        assert!(!fixture.gc.runtime_state().next_gc_full());
        fixture.check_list(0, MOS_NODES);
        fixture.check_list(1, 100);
    })
}
