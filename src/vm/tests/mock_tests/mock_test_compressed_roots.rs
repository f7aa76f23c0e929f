use super::mock_test_prelude::*;

#[test]
pub fn compressed_root_follows_promotion() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let base = memory_manager::gc_heap_base(fixture.gc);
        let object = fixture.alloc(MockType::new("object", 1, 2));
        set_payload(object, 0, 41);
        let child = fixture.alloc(MockType::new("child", 0, 1));
        set_payload(child, 0, 42);
        fixture.write(object, 0, Some(child));
        assert!(fixture.gc.heap().in_nos(object.to_raw_address()));
        set_compressed_root(base, 0, Some(object));
        assert_eq!(get_compressed_root(base, 0), Some(object));

        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Minor), 1);
        let promoted = get_compressed_root(base, 0).expect("the root keeps its referent");
        assert_ne!(promoted, object);
        assert!(fixture.gc.heap().in_mos(promoted.to_raw_address()));
        assert_eq!(get_payload(promoted, 0), 41);
        let child = fixture.read(promoted, 0).unwrap();
        assert_eq!(get_payload(child, 0), 42);
        fixture.verify_with_remsets();
    })
}

#[test]
pub fn compressed_and_full_roots_agree_after_compaction() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let base = memory_manager::gc_heap_base(fixture.gc);
        let node = MockType::new("node", 1, 2);
        let garbage = MockType::new("garbage", 0, 6);
        // Garbage below the list, so a major collection slides the list down.
        for _ in 0..2000 {
            fixture.alloc_with(garbage, AllocationSemantics::Mature);
        }
        fixture.build_list(0, node, 100, AllocationSemantics::Mature);
        set_compressed_root(base, 3, get_root(0));
        let before = get_root(0).unwrap();

        fixture.force_gc();
        let head = get_root(0).unwrap();
        assert_ne!(head, before);
        assert_eq!(get_compressed_root(base, 3), Some(head));
        fixture.check_list(0, 100);

        // A compressed root is enough to keep the list alive.
        set_root(0, None);
        fixture.force_gc();
        set_root(0, get_compressed_root(base, 3));
        fixture.check_list(0, 100);
    })
}
