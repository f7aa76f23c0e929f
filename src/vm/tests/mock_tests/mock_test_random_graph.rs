use super::mock_test_prelude::*;
use crate::util::options::PlanSelector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashSet};

const VERTICES: usize = 200;
const ROOTS: usize = 16;
const EDGES: usize = 4;

type Shape = BTreeMap<usize, Vec<Option<usize>>>;

fn vertex() -> &'static MockType {
    MockType::new("vertex", EDGES, 1)
}

/// Every vertex reachable from the roots. Nothing may allocate while the result is held.
fn reachable(fixture: &GcFixture) -> Vec<ObjectReference> {
    let mut seen = HashSet::new();
    let mut stack: Vec<ObjectReference> = (0..ROOTS).filter_map(get_root).collect();
    let mut out = vec![];
    while let Some(v) = stack.pop() {
        if !seen.insert(v) {
            continue;
        }
        out.push(v);
        stack.extend((0..EDGES).filter_map(|i| fixture.read(v, i)));
    }
    out
}

/// The reachable graph in terms of vertex ids, which survive moves.
fn shape(fixture: &GcFixture) -> Shape {
    reachable(fixture)
        .into_iter()
        .map(|v| {
            assert!(memory_manager::gc_is_heap_object(fixture.gc, v), "{} is not a heap object", v);
            let edges = (0..EDGES)
                .map(|i| fixture.read(v, i).map(|w| get_payload(w, 0)))
                .collect();
            (get_payload(v, 0), edges)
        })
        .collect()
}

fn build_graph(fixture: &mut GcFixture, rng: &mut StdRng) {
    for id in 0..VERTICES {
        let v = fixture.alloc(vertex());
        set_payload(v, 0, id);
        set_root(id, Some(v));
    }
    for id in 0..VERTICES {
        for i in 0..EDGES {
            if rng.random_bool(0.5) {
                let target = get_root(rng.random_range(0..VERTICES));
                fixture.write(get_root(id).unwrap(), i, target);
            }
        }
    }
    for id in ROOTS..VERTICES {
        set_root(id, None);
    }
}

fn rewire(fixture: &mut GcFixture, rng: &mut StdRng) {
    let live = reachable(fixture);
    for _ in 0..live.len() {
        let src = live[rng.random_range(0..live.len())];
        let target = if rng.random_bool(0.2) {
            None
        } else {
            Some(live[rng.random_range(0..live.len())])
        };
        fixture.write(src, rng.random_range(0..EDGES), target);
    }
}

fn collections_keep_the_graph(mut fixture: GcFixture, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    build_graph(&mut fixture, &mut rng);
    let garbage = MockType::new("garbage", 0, 4);
    for round in 0..6 {
        let expected = shape(&fixture);
        if round % 2 == 0 {
            fixture.alloc_until_collection(garbage);
        } else {
            fixture.force_gc();
        }
        assert_eq!(shape(&fixture), expected, "graph changed in round {}", round);
        fixture.verify();
        rewire(&mut fixture, &mut rng);
    }
}

#[test]
pub fn random_graph_generational() {
    with_mockvm(|| collections_keep_the_graph(GcFixture::new(), 7))
}

#[test]
pub fn random_graph_mark_sweep() {
    with_mockvm(|| {
        let fixture = GcFixture::create_with_builder(|builder| {
            builder.options.plan = PlanSelector::MarkSweep;
        });
        collections_keep_the_graph(fixture, 11)
    })
}
