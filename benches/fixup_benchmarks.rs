//! Performance benchmarks for the fixup phase
//!
//! Run with: cargo bench
//!
//! Each benchmark builds a graph once and runs the phase over fresh clones:
//! - Arithmetic specialization
//! - String concatenation into ropes
//! - Indexed loads with guard insertion
//! - The unboxing fixpoint over chained locals

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use quicksilver_dfg::{
    run_fixup_phase, ArrayMode, ArrayType, Graph, GraphBuilder, NodeType, ProfileSnapshot,
    SpeculatedType,
};

fn arithmetic_graph(blocks: usize) -> Graph {
    let mut b = GraphBuilder::new();
    for block in 0..blocks {
        if block > 0 {
            let next = b.add_block();
            b.switch_to(next);
        }
        let x = b.value(SpeculatedType::INT32);
        let y = b.value(SpeculatedType::INT32);
        let d = b.value(SpeculatedType::DOUBLE);
        let sum = b.binary(NodeType::ArithAdd, x, y, SpeculatedType::INT32);
        let mixed = b.binary(NodeType::ArithMul, sum, d, SpeculatedType::DOUBLE);
        let masked = b.binary(NodeType::BitAnd, sum, y, SpeculatedType::INT32);
        let less = b.binary(NodeType::CompareLess, masked, mixed, SpeculatedType::BOOLEAN);
        b.unary(NodeType::LogicalNot, less, SpeculatedType::BOOLEAN);
    }
    b.finish()
}

fn string_graph(blocks: usize) -> Graph {
    let mut b = GraphBuilder::new();
    for block in 0..blocks {
        if block > 0 {
            let next = b.add_block();
            b.switch_to(next);
        }
        let left = b.value(SpeculatedType::STRING);
        let right = b.value(SpeculatedType::STRING);
        let empty = b.string("");
        let pair = b.binary(NodeType::ValueAdd, left, right, SpeculatedType::STRING);
        b.node(NodeType::MakeRope, &[pair, empty, right], SpeculatedType::STRING);
    }
    b.finish()
}

fn indexed_load_graph(blocks: usize) -> Graph {
    let mut b = GraphBuilder::new();
    for block in 0..blocks {
        if block > 0 {
            let next = b.add_block();
            b.switch_to(next);
        }
        let typed = b.value(SpeculatedType::FLOAT64_ARRAY);
        let array = b.value(SpeculatedType::ARRAY);
        let index = b.value(SpeculatedType::INT32);
        b.get_by_val(
            typed,
            index,
            ArrayMode::new(ArrayType::SelectUsingPredictions),
            SpeculatedType::DOUBLE,
        );
        b.get_by_val(array, index, ArrayMode::new(ArrayType::Int32), SpeculatedType::INT32);
        b.get_by_id(array, "length", SpeculatedType::INT32);
    }
    b.finish()
}

fn chained_locals_graph(variables: usize) -> Graph {
    let mut b = GraphBuilder::new();
    let seed = b.int32(1);
    let mut value = seed;
    for local in 0..variables {
        let variable = b.variable(local as i32, SpeculatedType::INT32);
        b.set_local(variable, value);
        value = b.get_local(variable);
    }
    b.binary(NodeType::ArithAdd, value, seed, SpeculatedType::INT32);
    b.finish()
}

fn bench_graph(c: &mut Criterion, group_name: &str, build: fn(usize) -> Graph) {
    let mut group = c.benchmark_group(group_name);
    let oracle = ProfileSnapshot::new();

    for size in [1, 16, 256].iter() {
        let graph = build(*size);
        group.throughput(Throughput::Elements(graph.node_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            b.iter_batched(
                || graph.clone(),
                |mut graph| {
                    run_fixup_phase(&mut graph, &oracle);
                    black_box(graph)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_arithmetic(c: &mut Criterion) {
    bench_graph(c, "arithmetic", arithmetic_graph);
}

fn bench_strings(c: &mut Criterion) {
    bench_graph(c, "strings", string_graph);
}

fn bench_indexed_loads(c: &mut Criterion) {
    bench_graph(c, "indexed_loads", indexed_load_graph);
}

fn bench_unboxing_fixpoint(c: &mut Criterion) {
    bench_graph(c, "unboxing_fixpoint", chained_locals_graph);
}

criterion_group!(
    benches,
    bench_arithmetic,
    bench_strings,
    bench_indexed_loads,
    bench_unboxing_fixpoint,
);

criterion_main!(benches);
