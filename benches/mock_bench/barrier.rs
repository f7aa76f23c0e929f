use criterion::Criterion;

use gengc::memory_manager;
use gengc::util::test_util::fixtures::*;
use gengc::util::test_util::mock_vm::*;
use gengc::AllocationSemantics;

pub fn bench(c: &mut Criterion) {
    let mut fixture = GcFixture::new();
    let ty = MockType::new("bench", 1, 0);
    let old = fixture.alloc_with(ty, AllocationSemantics::Mature);
    set_root(0, Some(old));
    let young = fixture.alloc(ty);
    set_root(1, Some(young));
    let slot = MockType::ref_slot(old, 0);

    // Every store records an old-to-young slot. Nothing allocates, so the objects stay put.
    c.bench_function("write_barrier_old_to_young", |b| {
        b.iter(|| memory_manager::gc_heap_slot_write_ref(fixture.mutator(), old, slot, Some(young)))
    });

    c.bench_function("write_barrier_young_to_young", |b| {
        b.iter(|| memory_manager::gc_heap_slot_write_ref(fixture.mutator(), young, MockType::ref_slot(young, 0), Some(young)))
    });
}
