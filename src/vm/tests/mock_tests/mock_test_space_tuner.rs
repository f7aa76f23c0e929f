use super::mock_test_prelude::*;
use crate::plan::generational::TUNING_GRANULARITY;
use crate::policy::space::Space;

// The fixture's LOS is 13 blocks (416 KB): six 64 KB objects fit, the seventh does not.
const LARGE: usize = 64 * BYTES_IN_KBYTE;

fn alloc_large_at(fixture: &mut GcFixture, root: usize) {
    let object = fixture.alloc(MockType::sized("large", LARGE));
    set_root(root, Some(object));
}

#[test]
pub fn failed_large_allocation_grows_los() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let heap = fixture.gc.heap();
        let los_before = heap.los_end() - heap.start();
        let mos_before = fixture.gen_compact().mature().committed_bytes();

        for i in 0..6 {
            alloc_large_at(&mut fixture, i);
        }
        assert_eq!(fixture.gc.stats.collections(), 0);
        alloc_large_at(&mut fixture, 6);

        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Major), 1);
        let los_after = heap.los_end() - heap.start();
        let mos_after = fixture.gen_compact().mature().committed_bytes();
        assert!(los_after >= los_before + TUNING_GRANULARITY, "{} -> {}", los_before, los_after);
        // The space LOS gained came out of MOS, in whole blocks.
        let grown = los_after - los_before;
        assert_eq!(grown % BYTES_IN_BLOCK, 0);
        assert_eq!(
            mos_before - mos_after,
            grown,
            "MOS {} -> {}, LOS {} -> {}",
            mos_before,
            mos_after,
            los_before,
            los_after
        );
        for i in 0..7 {
            let object = get_root(i).unwrap();
            assert!(heap.in_los(object.to_raw_address()));
            assert!(memory_manager::gc_is_heap_object(fixture.gc, object));
        }
        assert_eq!(fixture.gc.los().failed_request(), 0);
        fixture.verify_with_remsets();
    })
}

#[test]
pub fn disabled_tuner_keeps_the_boundary() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.enable_space_tuner = false;
        });
        let heap = fixture.gc.heap();
        let los_before = heap.los_end();
        for i in 0..6 {
            alloc_large_at(&mut fixture, i);
        }
        // The seventh object only fits once the dead ones are swept.
        for i in 0..3 {
            set_root(i, None);
        }
        alloc_large_at(&mut fixture, 0);
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Major), 1);
        assert_eq!(heap.los_end(), los_before);
        assert_eq!(fixture.gc.los().num_objects(), 4);
    })
}

#[test]
pub fn idle_los_gives_space_to_mos() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let heap = fixture.gc.heap();
        let los_before = heap.los_end();
        // One live large object above four dead ones.
        let big = MockType::new("large", 1, LARGE / BYTES_IN_WORD);
        for i in 0..5 {
            let object = fixture.alloc(big);
            set_root(i, Some(object));
        }
        for i in 0..4 {
            set_root(i, None);
        }
        set_payload(get_root(4).unwrap(), 0, 99);

        // The first major collection starts a measurement period. Then MOS grows through
        // promotion while LOS sees no allocation, so the next major collection shrinks LOS.
        let node = MockType::new("node", 1, 30);
        fixture.build_list(5, node, 4000, AllocationSemantics::Default);
        fixture.force_gc();
        fixture.build_list(6, node, 2000, AllocationSemantics::Default);
        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        assert!(fixture.gc.stats.bytes_promoted() > 0);
        fixture.force_gc();

        assert!(heap.los_end() < los_before);
        let survivor = get_root(4).unwrap();
        assert_eq!(get_payload(survivor, 0), 99);
        // The survivor slid to the bottom of LOS.
        assert_eq!(survivor.to_raw_address(), heap.start());
        fixture.check_list(5, 4000);
        fixture.check_list(6, 2000);
        fixture.verify_with_remsets();
    })
}
