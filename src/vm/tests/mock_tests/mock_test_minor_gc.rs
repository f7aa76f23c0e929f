use super::mock_test_prelude::*;

fn garbage() -> &'static MockType {
    MockType::new("garbage", 1, 5)
}

#[test]
pub fn minor_gc_promotes_survivors() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let node = MockType::new("node", 1, 2);
        fixture.build_list(0, node, 500, AllocationSemantics::Default);
        assert!(fixture.gc.heap.in_nos(get_root(0).unwrap().to_raw_address()));

        fixture.alloc_until_collection(garbage());
        let stats = &fixture.gc.stats;
        assert_eq!(stats.collections_of(CollectionKind::Minor), 1);
        assert_eq!(stats.collections_of(CollectionKind::Major), 0);
        assert!(stats.bytes_promoted() >= 500 * node.size);

        fixture.check_list(0, 500);
        let head = get_root(0).unwrap();
        assert!(fixture.gc.heap.in_mos(head.to_raw_address()));
        assert!(fixture.verify_with_remsets() >= 500);
    })
}

#[test]
pub fn old_to_young_reference_is_remembered() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let holder = fixture.alloc_with(MockType::new("holder", 1, 0), AllocationSemantics::Mature);
        set_root(0, Some(holder));
        let young = fixture.alloc(MockType::new("young", 0, 1));
        set_payload(young, 0, 42);
        fixture.write(holder, 0, Some(young));
        // The slot in MOS must be in a remembered set.
        fixture.verify_with_remsets();

        fixture.alloc_until_collection(garbage());
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Minor), 1);
        // MOS objects do not move in a minor collection.
        assert_eq!(get_root(0), Some(holder));
        let promoted = fixture.read(holder, 0).expect("the young object must survive");
        assert_ne!(promoted, young);
        assert!(fixture.gc.heap.in_mos(promoted.to_raw_address()));
        assert_eq!(get_payload(promoted, 0), 42);
        fixture.verify_with_remsets();
    })
}

#[test]
pub fn young_to_young_reference_is_not_remembered() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let a = fixture.alloc(MockType::new("a", 1, 0));
        let b = fixture.alloc(MockType::new("b", 0, 0));
        fixture.write(a, 0, Some(b));
        fixture.mutator().flush();
        assert!(fixture.gc.metadata.mutator_remset_pool.is_empty());
    })
}

#[test]
pub fn non_generational_minor_traces_everything() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.generational = false;
        });
        assert!(!fixture.gen_compact().is_generational());
        let holder = fixture.alloc_with(MockType::new("holder", 1, 0), AllocationSemantics::Mature);
        set_root(0, Some(holder));
        let young = fixture.alloc(MockType::new("young", 0, 1));
        set_payload(young, 0, 7);
        fixture.write(holder, 0, Some(young));
        fixture.mutator().flush();
        // No barrier without generations.
        assert!(fixture.gc.metadata.mutator_remset_pool.is_empty());

        fixture.alloc_until_collection(garbage());
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Minor), 1);
        let promoted = fixture.read(holder, 0).expect("the young object must survive");
        assert_eq!(get_payload(promoted, 0), 7);
        // Marks left on MOS objects are cleared.
        fixture.verify();
    })
}

#[test]
pub fn partial_forward_keeps_the_young_half() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.nos_partial_forward = true;
        });
        assert!(fixture.gen_compact().nursery().is_partial_forward());
        let node = MockType::new("node", 1, 2);
        fixture.build_list(0, node, 300, AllocationSemantics::Default);
        for _ in 0..3 {
            fixture.alloc_until_collection(garbage());
            fixture.check_list(0, 300);
            fixture.verify_with_remsets();
        }
        assert!(fixture.gc.stats.collections_of(CollectionKind::Minor) >= 1);
    })
}

#[test]
pub fn many_minor_collections() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let node = MockType::new("node", 1, 2);
        for round in 0..4 {
            fixture.build_list(round, node, 200, AllocationSemantics::Default);
            fixture.alloc_until_collection(garbage());
        }
        for round in 0..4 {
            fixture.check_list(round, 200);
        }
        assert!(fixture.gc.stats.collections() >= 4);
        fixture.verify_with_remsets();
    })
}
