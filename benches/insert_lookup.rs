//! Insert and point-lookup throughput, in the style of the teacher's
//! `buffer-pool-manager` benchmarks (one `criterion` group per backend,
//! `iter_custom` timing a whole fresh-tree run rather than a single call,
//! since each iteration needs its own clean device).

use block_device::MemBlockDevice;
use common::Config;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use microbtree::Tree;

const NUM_KEYS: u32 = 2_000;

fn cfg() -> Config {
    Config::variant_a(4096, 16, 4, 8)
}

fn bench_sequential_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Insert - sequential ascending keys");
    group.sample_size(10);
    group.bench_function("put", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();
            for _ in 0..iters {
                let dev = MemBlockDevice::new(cfg().page_size);
                let mut tree = Tree::init(&cfg(), dev).unwrap();
                for k in 0..black_box(NUM_KEYS) {
                    tree.put(&k.to_be_bytes(), &(k as u64).to_le_bytes()).unwrap();
                }
            }
            start.elapsed()
        });
    });
    group.finish();
}

fn bench_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("Lookup - point get on a filled tree");
    group.sample_size(10);
    group.bench_function("get", |b| {
        b.iter_custom(|iters| {
            let dev = MemBlockDevice::new(cfg().page_size);
            let mut tree = Tree::init(&cfg(), dev).unwrap();
            for k in 0..NUM_KEYS {
                tree.put(&k.to_be_bytes(), &(k as u64).to_le_bytes()).unwrap();
            }

            let start = std::time::Instant::now();
            for i in 0..iters {
                let k = (i as u32) % NUM_KEYS;
                let mut out = [0u8; 8];
                black_box(tree.get(&k.to_be_bytes(), &mut out).unwrap());
            }
            start.elapsed()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_sequential_insert, bench_point_lookup);
criterion_main!(benches);
