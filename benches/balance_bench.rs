// benches/balance_bench.rs

//! Benchmarks for name expansion and producer partitioning, the two hot
//! paths of a reconciliation pass.

use conductor::core::expand::expand;
use conductor::core::reconcile::partition;
use conductor::core::topology::{Producer, ProducerType};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_expand(c: &mut Criterion) {
    c.bench_function("expand_1600_names", |b| {
        b.iter(|| expand(black_box("nid[0001-0100]-[10001-10016]")).unwrap())
    });
}

fn bench_partition(c: &mut Criterion) {
    let producers: Vec<Producer> = (0..512)
        .map(|i| Producer {
            name: format!("node-{i:04}"),
            host: format!("node-{i:04}"),
            group: "l1".to_string(),
            ptype: ProducerType::Active,
            reconnect: "20s".to_string(),
            updaters: Vec::new(),
        })
        .collect();
    let ready: Vec<String> = (0..16).map(|i| format!("agg-{i:02}")).collect();

    c.bench_function("partition_512_over_16", |b| {
        b.iter(|| partition(black_box(&producers), black_box(&ready)))
    });
}

criterion_group!(benches, bench_expand, bench_partition);
criterion_main!(benches);
