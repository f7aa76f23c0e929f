use super::mock_test_prelude::*;
use crate::util::options::{MajorAlgorithm, PlanSelector};
use crate::GCBuilder;
use std::sync::atomic::Ordering;

#[test]
pub fn set_option_by_name() {
    let mut builder = GCBuilder::new_no_env_vars();
    assert!(builder.set_option("plan", "MarkSweep"));
    assert_eq!(builder.options.plan, PlanSelector::MarkSweep);
    assert!(builder.set_option("major_algorithm", "MoveCompact"));
    assert_eq!(builder.options.major_algorithm, MajorAlgorithm::MoveCompact);
    assert!(builder.set_option("nursery_size", "2097152"));
    assert_eq!(builder.options.nursery_size, 2 * BYTES_IN_MBYTE);

    assert!(!builder.set_option("no_such_option", "1"));
    assert!(!builder.set_option("threads", "0"));
    assert!(!builder.set_option("plan", "Parallel"));
    assert_eq!(builder.options.plan, PlanSelector::MarkSweep);
}

#[test]
pub fn ignore_system_gc() {
    with_mockvm(|| {
        let mut fixture = GcFixture::create_with_builder(|builder| {
            builder.options.ignore_system_gc = true;
        });
        fixture.force_gc();
        assert_eq!(memory_manager::gc_get_collection_count(fixture.gc), 0);
        assert_eq!(STOP_CALLS.load(Ordering::SeqCst), 0);

        // Collections the heap needs still happen.
        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        assert_eq!(memory_manager::gc_get_collection_count(fixture.gc), 1);
    })
}

#[test]
pub fn every_pause_stops_and_resumes_mutators() {
    with_mockvm(|| {
        let mut fixture = GcFixture::new();
        fixture.force_gc();
        fixture.alloc_until_collection(MockType::new("garbage", 0, 4));
        assert_eq!(STOP_CALLS.load(Ordering::SeqCst), 2);
        assert_eq!(RESUME_CALLS.load(Ordering::SeqCst), 2);
        assert_eq!(OOM_CALLS.load(Ordering::SeqCst), 0);
    })
}

#[test]
pub fn collector_threads_follow_the_option() {
    with_mockvm(|| {
        let fixture = GcFixture::create_with_builder(|builder| {
            builder.options.threads = 3;
        });
        assert_eq!(fixture.gc.options().threads, 3);
        assert_eq!(fixture.gc.collectors.num_collectors(), 3);
    })
}

#[test]
#[should_panic(expected = "Out of memory")]
pub fn unusable_heap_reports_out_of_memory() {
    with_mockvm(|| {
        // Too little is left for MOS and NOS once LOS takes its share.
        let _fixture = GcFixture::create_with_builder(|builder| {
            builder.options.los_ratio = 0.99;
        });
    })
}
