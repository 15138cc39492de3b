//! Benchmarks for the grid trie
//!
//! Measures performance of:
//! - Local insertion
//! - Longest-match lookup at different depths
//! - Grafting fetched subtrees over stubs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use grid_trie::{Key, Subtree, Trie};

fn key_of(i: u64, depth: usize) -> Vec<u8> {
    let mut key = i.to_be_bytes().to_vec();
    key.resize(depth, b'/');
    key
}

/// Benchmark inserting keys of growing depth
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for &depth in &[8usize, 32, 128] {
        group.throughput(Throughput::Elements(1_000));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &d| {
            b.iter(|| {
                let mut trie = Trie::new();
                for i in 0..1_000u64 {
                    let _ = trie.insert(&key_of(i, d), "v");
                }
                black_box(trie.node_count())
            })
        });
    }
    group.finish();
}

/// Benchmark lookup in a populated trie
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for &depth in &[8usize, 32, 128] {
        let mut trie = Trie::new();
        for i in 0..10_000u64 {
            let _ = trie.insert(&key_of(i, depth), "v");
        }
        let probe = key_of(4_242, depth);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &probe, |b, k| {
            b.iter(|| trie.lookup(black_box(k)))
        });
    }
    group.finish();
}

/// Benchmark grafting a fetched region over a stub
fn bench_graft(c: &mut Criterion) {
    let mut group = c.benchmark_group("graft");

    for &size in &[10u64, 100, 1_000] {
        let subtree = Subtree::from_pairs((0..size).map(|i| (key_of(i, 8), "v")));

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &subtree, |b, s| {
            b.iter(|| {
                let mut trie = Trie::new();
                let mount = Key::from("mnt");
                if let Ok(Some(stub)) = trie.place_stub(&mount) {
                    let _ = trie.graft(stub, s.clone(), &[]);
                }
                black_box(trie.node_count())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_graft);

criterion_main!(benches);
