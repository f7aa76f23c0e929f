use criterion::Criterion;

use gengc::memory_manager;
use gengc::util::test_util::fixtures::*;
use gengc::util::test_util::mock_vm::*;
use gengc::AllocationSemantics;

pub fn bench(c: &mut Criterion) {
    // A 64 MB heap with a 16 MB nursery, so most iterations do not collect.
    let mut fixture = GcFixture::create_with_builder(|builder| {
        builder.set_option("min_heap", "67108864");
        builder.set_option("max_heap", "67108864");
        builder.set_option("nursery_size", "16777216");
    });
    let ty = MockType::new("bench", 1, 2);

    c.bench_function("alloc", |b| {
        b.iter(|| {
            memory_manager::gc_alloc(fixture.mutator(), ty.size, ty.vtable(), AllocationSemantics::Default)
        })
    });

    c.bench_function("alloc_fast", |b| {
        b.iter(|| {
            memory_manager::gc_alloc_fast(fixture.mutator(), ty.size, ty.vtable()).or_else(|| {
                memory_manager::gc_alloc(fixture.mutator(), ty.size, ty.vtable(), AllocationSemantics::Default)
            })
        })
    });
}
