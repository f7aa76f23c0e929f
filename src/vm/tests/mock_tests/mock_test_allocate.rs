use super::mock_test_prelude::*;

#[test]
pub fn allocate_small_in_nursery() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let ty = MockType::new("node", 2, 3);
        let object = fixture.alloc(ty);
        let addr = object.to_raw_address();
        info!("Allocated {} bytes at {}", ty.size, addr);

        assert!(fixture.gc.heap.in_nos(addr));
        assert!(addr.is_aligned_to(ObjectReference::ALIGNMENT));
        assert_eq!(crate::util::header::vtable(object), ty.vtable());
        for i in 0..ty.num_refs {
            assert_eq!(get_ref(object, i), None);
        }
        for i in 0..3 {
            assert_eq!(get_payload(object, i), 0);
        }
        assert!(memory_manager::gc_is_heap_object(fixture.gc, object));
    })
}

#[test]
pub fn allocate_mature_and_large() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let mature = fixture.alloc_with(MockType::new("mature", 1, 1), AllocationSemantics::Mature);
        assert!(fixture.gc.heap.in_mos(mature.to_raw_address()));

        let big = MockType::sized("big", 16 * BYTES_IN_KBYTE);
        let large = fixture.alloc(big);
        assert!(fixture.gc.heap.in_los(large.to_raw_address()));
        assert!(memory_manager::gc_is_heap_object(fixture.gc, large));
        // Only the start of a large object is an object.
        let interior = unsafe { ObjectReference::from_raw_address_unchecked(large.to_raw_address() + 64usize) };
        assert!(!memory_manager::gc_is_heap_object(fixture.gc, interior));

        // Small objects go to LOS when asked for.
        let forced = fixture.alloc_with(MockType::new("small", 0, 1), AllocationSemantics::Los);
        assert!(fixture.gc.heap.in_los(forced.to_raw_address()));
    })
}

#[test]
pub fn allocate_fast_path() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let ty = MockType::new("node", 1, 1);
        // The mutator has no nursery block yet.
        assert!(memory_manager::gc_alloc_fast(fixture.mutator(), ty.size, ty.vtable()).is_none());

        let first = fixture.alloc(ty);
        let second = memory_manager::gc_alloc_fast(fixture.mutator(), ty.size, ty.vtable())
            .expect("the fast path should use the block of the slow path");
        assert_eq!(second.to_raw_address(), first.to_raw_address() + ty.size);

        // Large sizes never take the fast path.
        let big = MockType::sized("big", 16 * BYTES_IN_KBYTE);
        assert!(memory_manager::gc_alloc_fast(fixture.mutator(), big.size, big.vtable()).is_none());
    })
}

#[test]
pub fn allocate_unaligned_size() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let ty = MockType::new("node", 0, 1);
        let a = memory_manager::gc_alloc(fixture.mutator(), 20, ty.vtable(), AllocationSemantics::Default).unwrap();
        let b = memory_manager::gc_alloc(fixture.mutator(), 20, ty.vtable(), AllocationSemantics::Default).unwrap();
        assert_eq!(b.to_raw_address() - a.to_raw_address(), 24);
        // Requests below the header size get a whole header.
        let c = memory_manager::gc_alloc(fixture.mutator(), 1, ty.vtable(), AllocationSemantics::Default).unwrap();
        let d = memory_manager::gc_alloc(fixture.mutator(), 1, ty.vtable(), AllocationSemantics::Default).unwrap();
        assert_eq!(d.to_raw_address() - c.to_raw_address(), MIN_OBJECT_SIZE);
    })
}

#[test]
pub fn heap_bounds_and_sizes() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let gc = fixture.gc;
        let object = fixture.alloc(MockType::new("node", 0, 1));
        let base = memory_manager::gc_heap_base(gc);
        let ceiling = memory_manager::gc_heap_ceiling(gc);
        assert!(base <= object.to_raw_address() && object.to_raw_address() < ceiling);

        let total = memory_manager::gc_total_memory(gc);
        assert_eq!(total, 4 * BYTES_IN_MBYTE);
        assert!(memory_manager::gc_free_memory(gc) <= total);
        assert_eq!(memory_manager::gc_max_memory(gc), 16 * BYTES_IN_MBYTE);

        let outside = unsafe { ObjectReference::from_raw_address_unchecked(ceiling + 4096usize) };
        assert!(!memory_manager::gc_is_heap_object(gc, outside));
        assert_eq!(memory_manager::gc_get_collection_count(gc), 0);
    })
}

#[test]
pub fn identity_hash_is_stable() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let object = fixture.alloc(MockType::new("node", 0, 1));
        let hash = memory_manager::gc_get_hashcode(object);
        assert_ne!(hash, 0);
        assert_eq!(memory_manager::gc_get_hashcode(object), hash);
        // Hashing does not disturb the object.
        assert_eq!(get_payload(object, 0), 0);
        assert!(memory_manager::gc_is_heap_object(fixture.gc, object));
    })
}
