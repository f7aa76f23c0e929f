use super::mock_test_prelude::*;

/// Root a reference object of `kind` at `root` whose referent is a new object with payload
/// `tag`. The referent is not rooted.
fn alloc_reference(fixture: &mut GcFixture, root: usize, kind: ReferenceKind, tag: usize) {
    let reference = fixture.alloc(MockType::reference("reference", kind));
    set_root(root, Some(reference));
    let referent = fixture.alloc(MockType::new("referent", 0, 1));
    set_payload(referent, 0, tag);
    fixture.write(reference, 0, Some(referent));
}

fn referent(fixture: &GcFixture, root: usize) -> Option<ObjectReference> {
    fixture.read(get_root(root).unwrap(), 0)
}

#[test]
pub fn weak_reference_is_cleared_and_enqueued() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        alloc_reference(&mut fixture, 0, ReferenceKind::Weak, 1);
        fixture.force_gc();

        assert_eq!(referent(&fixture, 0), None);
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), get_root(0));
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), None);
    })
}

#[test]
pub fn weak_reference_to_live_object_is_updated() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        alloc_reference(&mut fixture, 0, ReferenceKind::Weak, 2);
        set_root(1, referent(&fixture, 0));
        fixture.force_gc();

        let target = referent(&fixture, 0).expect("a strongly reachable referent stays");
        assert_eq!(Some(target), get_root(1));
        assert_eq!(get_payload(target, 0), 2);
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), None);
    })
}

#[test]
pub fn weak_reference_cleared_by_minor_collection() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        alloc_reference(&mut fixture, 0, ReferenceKind::Weak, 3);
        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Minor), 1);
        assert_eq!(referent(&fixture, 0), None);
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), get_root(0));
    })
}

#[test]
pub fn soft_reference_survives_minor_but_not_major() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        alloc_reference(&mut fixture, 0, ReferenceKind::Soft, 4);
        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::Minor), 1);
        let kept = referent(&fixture, 0).expect("minor collections keep soft referents");
        assert_eq!(get_payload(kept, 0), 4);

        fixture.force_gc();
        assert_eq!(referent(&fixture, 0), None);
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), get_root(0));
    })
}

#[test]
pub fn phantom_reference_waits_for_finalization() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        let phantom = fixture.alloc(MockType::reference("phantom", ReferenceKind::Phantom));
        set_root(0, Some(phantom));
        let weak = fixture.alloc(MockType::reference("weak", ReferenceKind::Weak));
        set_root(1, Some(weak));
        let finalizable = fixture.alloc(MockType::finalizable("finalizable"));
        set_payload(finalizable, 0, 5);
        fixture.write(phantom, 0, Some(finalizable));
        fixture.write(weak, 0, Some(finalizable));

        // Weak references are cleared before finalization, phantom references after.
        fixture.force_gc();
        assert_eq!(referent(&fixture, 1), None);
        let resurrected = referent(&fixture, 0).expect("the finalizer has not run yet");
        assert_eq!(get_payload(resurrected, 0), 5);
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), get_root(1));
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), None);

        let taken = memory_manager::gc_get_finalizable_object(fixture.gc);
        assert_eq!(taken, Some(resurrected));
        fixture.force_gc();
        assert_eq!(referent(&fixture, 0), None);
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), get_root(0));
    })
}

#[test]
pub fn no_reference_types_makes_references_strong() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.no_reference_types = true;
        });
        alloc_reference(&mut fixture, 0, ReferenceKind::Weak, 6);
        fixture.force_gc();
        let kept = referent(&fixture, 0).expect("references are strong");
        assert_eq!(get_payload(kept, 0), 6);
        assert_eq!(memory_manager::gc_get_enqueued_reference(fixture.gc), None);
    })
}
