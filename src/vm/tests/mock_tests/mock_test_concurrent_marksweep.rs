use super::mock_test_prelude::*;
use crate::plan::ConcurrentPhase;
use crate::util::options::{ConcurrentAlgorithm, PlanSelector};
use std::time::{Duration, Instant};

const LIST_LEN: usize = 2000;

fn concurrent_fixture(algorithm: ConcurrentAlgorithm) -> GcFixture {
    let fixture = GcFixture::create_with_builder(|builder| {
        builder.options.plan = PlanSelector::MarkSweep;
        builder.options.concurrent = algorithm;
    });
    assert!(fixture.mark_sweep().is_concurrent());
    assert_eq!(fixture.mark_sweep().algorithm(), algorithm);
    fixture
}

fn node() -> &'static MockType {
    MockType::new("node", 1, 3)
}

fn phase(fixture: &GcFixture) -> ConcurrentPhase {
    fixture.gc.runtime_state().phase()
}

/// Allocate garbage until the scheduler starts a concurrent mark. Allocation polls the
/// scheduler before it allocates, so the cycle is still marking when this returns.
fn start_cycle(fixture: &mut GcFixture) {
    let garbage = MockType::new("garbage", 0, 4);
    let mut n = 0;
    while phase(fixture) == ConcurrentPhase::Idle {
        fixture.alloc(garbage);
        n += 1;
        assert!(n < 1 << 20, "no concurrent cycle after {} allocations", n);
    }
    assert_eq!(phase(fixture), ConcurrentPhase::Marking);
}

/// Poll until the cycle in progress is done.
fn finish_cycle(fixture: &GcFixture) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while phase(fixture) != ConcurrentPhase::Idle {
        memory_manager::gc_try_schedule_collection(fixture.gc);
        assert!(Instant::now() < deadline, "stuck in {:?}", phase(fixture));
        std::thread::yield_now();
    }
}

/// Cut the list at root 0 after its head while a cycle is marking, so that its tail is only
/// reachable from root 1, which the cycle's root snapshot did not see.
fn cut_list_while_marking(fixture: &mut GcFixture) {
    let head = get_root(0).unwrap();
    let tail = fixture.read(head, 0);
    set_root(1, tail);
    fixture.write(head, 0, None);
}

fn check_cut_list(fixture: &GcFixture) {
    let head = get_root(0).unwrap();
    assert_eq!(get_payload(head, 0), 0);
    assert_eq!(fixture.read(head, 0), None);
    let mut cursor = get_root(1);
    for i in 1..LIST_LEN {
        let node = cursor.unwrap_or_else(|| panic!("tail ends at {}", i));
        assert!(memory_manager::gc_is_heap_object(fixture.gc, node));
        assert_eq!(get_payload(node, 0), i);
        cursor = fixture.read(node, 0);
    }
    assert_eq!(cursor, None);
}

fn mutate_during_cycle(algorithm: ConcurrentAlgorithm) {
    let mut fixture = concurrent_fixture(algorithm);
    fixture.build_list(0, node(), LIST_LEN, AllocationSemantics::Default);
    start_cycle(&mut fixture);

    cut_list_while_marking(&mut fixture);
    // Allocated while the cycle runs, and reachable from nothing the cycle has seen.
    fixture.build_list(2, node(), 500, AllocationSemantics::Default);
    finish_cycle(&fixture);

    let stats = &fixture.gc.stats;
    assert!(stats.collections_of(CollectionKind::MarkSweep) >= 1);
    assert!(stats.bytes_reclaimed() > 0);
    assert!(fixture.mark_sweep().scheduler().num_samples() >= 1);
    check_cut_list(&fixture);
    fixture.check_list(2, 500);
    fixture.verify();
}

#[test]
pub fn satb_keeps_objects_reachable_at_the_snapshot() {
    with_mockvm(|| mutate_during_cycle(ConcurrentAlgorithm::Satb))
}

#[test]
pub fn mostly_concurrent_retraces_changed_roots() {
    with_mockvm(|| mutate_during_cycle(ConcurrentAlgorithm::MostlyConcurrent))
}

#[test]
pub fn explicit_collection_completes_the_cycle() {
    with_mockvm(|| {
        let mut fixture = concurrent_fixture(ConcurrentAlgorithm::Satb);
        fixture.build_list(0, node(), LIST_LEN, AllocationSemantics::Default);
        start_cycle(&mut fixture);

        // The cycle in progress is finished, then a stop-the-world collection runs.
        fixture.force_gc();
        assert_eq!(phase(&fixture), ConcurrentPhase::Idle);
        assert_eq!(fixture.gc.stats.collections_of(CollectionKind::MarkSweep), 2);
        fixture.check_list(0, LIST_LEN);
        fixture.verify();
    })
}

#[test]
pub fn write_barrier_is_idle_outside_marking() {
    with_mockvm(|| {
        let mut fixture = concurrent_fixture(ConcurrentAlgorithm::Satb);
        let a = fixture.alloc(node());
        set_root(0, Some(a));
        let b = fixture.alloc(node());
        fixture.write(a, 0, Some(b));
        fixture.write(a, 0, None);
        fixture.mutator().flush();
        assert!(fixture.gc.metadata.dirty_obj_pool.is_empty());
        fixture.assert_buffers_conserved();
    })
}

#[test]
pub fn finalizers_run_after_a_concurrent_cycle() {
    with_mockvm(|| {
        let mut fixture = concurrent_fixture(ConcurrentAlgorithm::MostlyConcurrent);
        let object = fixture.alloc(MockType::finalizable("finalizable"));
        set_payload(object, 0, 7);
        start_cycle(&mut fixture);
        finish_cycle(&fixture);

        let object = memory_manager::gc_get_finalizable_object(fixture.gc)
            .expect("the unreachable object is queued");
        assert_eq!(get_payload(object, 0), 7);
        assert!(FINALIZATION_CALLS.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    })
}
