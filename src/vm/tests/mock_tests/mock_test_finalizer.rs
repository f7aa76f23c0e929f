use super::mock_test_prelude::*;
use std::sync::atomic::Ordering;

/// Allocate an unrooted finalizable object with payload `tag` that holds a child with payload
/// `tag + 1`.
fn alloc_dead_finalizable(fixture: &mut GcFixture, tag: usize) {
    let object = fixture.alloc(MockType::finalizable("finalizable"));
    set_payload(object, 0, tag);
    let child = fixture.alloc(MockType::new("child", 0, 1));
    set_payload(child, 0, tag + 1);
    fixture.write(object, 0, Some(child));
}

fn check_resurrected(fixture: &GcFixture, object: ObjectReference, tag: usize) {
    assert!(memory_manager::gc_is_heap_object(fixture.gc, object));
    assert_eq!(get_payload(object, 0), tag);
    let child = fixture.read(object, 0).expect("the finalizer's referents are kept alive");
    assert_eq!(get_payload(child, 0), tag + 1);
}

#[test]
pub fn dead_object_is_queued_for_finalization() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        alloc_dead_finalizable(&mut fixture, 10);
        assert_eq!(fixture.gc.finref.num_registered(), 1);

        fixture.force_gc();
        assert_eq!(FINALIZATION_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.gc.finref.num_finalizable(), 1);
        assert_eq!(fixture.gc.finref.num_registered(), 0);

        // The queue keeps the object alive until the runtime takes it.
        fixture.force_gc();
        assert_eq!(FINALIZATION_CALLS.load(Ordering::SeqCst), 1);
        fixture.verify();

        let object = memory_manager::gc_get_finalizable_object(fixture.gc).unwrap();
        check_resurrected(&fixture, object, 10);
        assert!(memory_manager::gc_get_finalizable_object(fixture.gc).is_none());
    })
}

#[test]
pub fn live_object_is_not_finalized() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let object = fixture.alloc(MockType::finalizable("finalizable"));
        set_root(0, Some(object));
        fixture.force_gc();
        fixture.force_gc();
        assert_eq!(FINALIZATION_CALLS.load(Ordering::SeqCst), 0);
        assert!(memory_manager::gc_get_finalizable_object(fixture.gc).is_none());
        assert_eq!(fixture.gc.finref.num_registered(), 1);

        // Once unreachable, it is finalized exactly once.
        set_root(0, None);
        fixture.force_gc();
        assert!(memory_manager::gc_get_finalizable_object(fixture.gc).is_some());
        fixture.force_gc();
        assert!(memory_manager::gc_get_finalizable_object(fixture.gc).is_none());
        assert_eq!(FINALIZATION_CALLS.load(Ordering::SeqCst), 1);
    })
}

#[test]
pub fn minor_collection_finalizes_nursery_objects() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        alloc_dead_finalizable(&mut fixture, 20);
        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Minor), 1);
        let object = memory_manager::gc_get_finalizable_object(fixture.gc).unwrap();
        // Resurrected objects are promoted like any survivor.
        assert!(fixture.gc.heap.in_mos(object.to_raw_address()));
        check_resurrected(&fixture, object, 20);
    })
}

#[test]
pub fn finalize_on_exit_queues_everything() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        for i in 0..3 {
            let object = fixture.alloc(MockType::finalizable("finalizable"));
            set_payload(object, 0, i);
            set_root(i, Some(object));
        }
        assert_eq!(memory_manager::gc_finalize_on_exit(fixture.gc), 3);
        let mut tags = vec![];
        while let Some(object) = memory_manager::gc_get_finalizable_object(fixture.gc) {
            tags.push(get_payload(object, 0));
        }
        tags.sort_unstable();
        assert_eq!(tags, vec![0, 1, 2]);
        assert_eq!(memory_manager::gc_finalize_on_exit(fixture.gc), 0);
    })
}

#[test]
pub fn no_finalizer_option() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.no_finalizer = true;
        });
        alloc_dead_finalizable(&mut fixture, 30);
        assert_eq!(fixture.gc.finref.num_registered(), 0);
        fixture.force_gc();
        assert!(memory_manager::gc_get_finalizable_object(fixture.gc).is_none());
        assert_eq!(memory_manager::gc_finalize_on_exit(fixture.gc), 0);
        assert_eq!(FINALIZATION_CALLS.load(Ordering::SeqCst), 0);
    })
}
