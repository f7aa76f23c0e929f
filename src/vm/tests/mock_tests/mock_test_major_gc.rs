use super::mock_test_prelude::*;
use crate::policy::block::BlockStatus;
use crate::policy::space::Space;
use crate::util::options::MajorAlgorithm;

const LIST_LEN: usize = 2000;

/// Allocate a list in MOS with a dead object between every two nodes. Each node keeps its
/// position in payload word 0 and its identity hash in payload word 1.
fn build_fragmented_list(fixture: &mut GcFixture) {
    let node = MockType::new("node", 1, 2);
    let garbage = MockType::new("garbage", 0, 6);
    for i in 0..LIST_LEN {
        fixture.alloc_with(garbage, AllocationSemantics::Mature);
        let n = fixture.alloc_with(node, AllocationSemantics::Mature);
        set_payload(n, 0, LIST_LEN - 1 - i);
        set_payload(n, 1, memory_manager::gc_get_hashcode(n) as usize);
        let next = get_root(0);
        fixture.write(n, 0, next);
        set_root(0, Some(n));
    }
}

fn check_hashes(fixture: &GcFixture) {
    let mut cursor = get_root(0);
    while let Some(n) = cursor {
        assert_eq!(memory_manager::gc_get_hashcode(n) as usize, get_payload(n, 1));
        cursor = fixture.read(n, 0);
    }
}

/// Check that compaction left MOS dense: every block in use lies within the blocks the live
/// data needs, plus a partly filled target and a block skipped in a race per collector.
fn check_packed(fixture: &GcFixture) {
    let heap = fixture.gc.heap();
    let live = fixture.gen_compact().mature().used_bytes();
    let collectors = fixture.gc.collectors.num_collectors();
    let bound = live.div_ceil(BYTES_IN_BLOCK) + 2 * collectors;
    let first = heap.los_end_block();
    for i in first..heap.nos_start_block() {
        if heap.blocks.status(i) != BlockStatus::Free {
            assert!(
                i - first < bound,
                "MOS block {} is in use, but {} bytes of live data need fewer than {} blocks",
                i - first,
                live,
                bound
            );
        }
    }
}

fn compact_fragmented_mos(algorithm: MajorAlgorithm) {
    let mut fixture = GcFixture::create_with_builder(|builder| {
        builder.options.major_algorithm = algorithm;
    });
    build_fragmented_list(&mut fixture);
    fixture.mutator().flush();
    let used_before = fixture.gen_compact().mature().used_bytes();
    let head_before = get_root(0).unwrap();

    fixture.force_gc();
    assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Major), 1);
    assert_eq!(memory_manager::gc_get_collection_count(fixture.gc), 1);
    fixture.check_list(0, LIST_LEN);
    check_hashes(&fixture);
    check_packed(&fixture);

    let used_after = fixture.gen_compact().mature().used_bytes();
    info!("MOS used {} -> {} with {}", used_before, used_after, algorithm);
    assert!(used_after < used_before);
    assert_ne!(get_root(0), Some(head_before));
    assert!(fixture.verify_with_remsets() >= LIST_LEN);

    // A second major collection has nothing left to reclaim.
    fixture.force_gc();
    fixture.check_list(0, LIST_LEN);
    check_hashes(&fixture);
    assert!(fixture.gen_compact().mature().used_bytes() <= used_after);
}

#[test]
pub fn major_slide_compact() {
    with_mockvm(|| compact_fragmented_mos(MajorAlgorithm::SlideCompact))
}

#[test]
pub fn major_move_compact() {
    with_mockvm(|| compact_fragmented_mos(MajorAlgorithm::MoveCompact))
}

#[test]
pub fn major_empties_the_nursery() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let node = MockType::new("node", 1, 2);
        fixture.build_list(0, node, 1000, AllocationSemantics::Default);
        assert!(fixture.gc.heap.in_nos(get_root(0).unwrap().to_raw_address()));

        fixture.force_gc();
        fixture.check_list(0, 1000);
        assert!(fixture.gc.heap.in_mos(get_root(0).unwrap().to_raw_address()));
        assert_eq!(fixture.gen_compact().nursery().used_bytes(), 0);
        fixture.verify_with_remsets();
    })
}

#[test]
pub fn major_reclaims_garbage() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let garbage = MockType::new("garbage", 1, 10);
        for _ in 0..5000 {
            fixture.alloc_with(garbage, AllocationSemantics::Mature);
        }
        fixture.mutator().flush();
        let free_before = memory_manager::gc_free_memory(fixture.gc);
        fixture.force_gc();
        let free_after = memory_manager::gc_free_memory(fixture.gc);
        assert!(free_after > free_before, "{} -> {}", free_before, free_after);
        assert_eq!(fixture.gen_compact().mature().used_bytes(), 0);
        assert!(fixture.gc.stats.bytes_reclaimed() > 0);
        assert!(memory_manager::gc_get_collection_time(fixture.gc) > std::time::Duration::ZERO);
    })
}

#[test]
pub fn forced_major_every_second_collection() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.force_major_every = 2;
        });
        let garbage = MockType::new("garbage", 1, 5);
        fixture.build_list(0, MockType::new("node", 1, 2), 100, AllocationSemantics::Default);
        fixture.alloc_until_collection(garbage);
        fixture.alloc_until_collection(garbage);
        let stats = &fixture.gc.stats;
        assert_eq!(stats.collections_of(CollectionKind::Minor), 1);
        assert_eq!(stats.collections_of(CollectionKind::Major), 1);
        fixture.check_list(0, 100);
    })
}

#[test]
pub fn verify_heap_around_collections() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.verify_heap = true;
        });
        fixture.build_list(0, MockType::new("node", 1, 2), 500, AllocationSemantics::Default);
        fixture.alloc_until_collection(MockType::new("garbage", 1, 5));
        fixture.force_gc();
        fixture.check_list(0, 500);
    })
}
