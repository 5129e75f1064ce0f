//! Criterion benchmarks for pixdex.
//!
//! Covers the hot paths of a federated query:
//! - Exact inner-product scan of one index
//! - Bounded top-k merge across scopes
//! - Artifact encode and decode
//! - End-to-end search over many cached scopes

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::Rng;

use pixdex::config::PixdexConfig;
use pixdex::embedding::PrecomputedEmbedder;
use pixdex::scope::{OwnerMap, Scope};
use pixdex::search::{SearchHit, TopKMerger};
use pixdex::service::SearchService;
use pixdex::storage::memory::MemoryStorage;
use pixdex::vector::FlatIndex;
use pixdex::vector::io::{from_bytes, to_bytes};

/// Generate random test vectors.
fn generate_test_vectors(count: usize, dimension: usize) -> Vec<Vec<f32>> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect()
}

fn build_index(count: usize, dimension: usize) -> FlatIndex {
    let vectors = generate_test_vectors(count, dimension);
    let ids: Vec<i64> = (0..count as i64).collect();
    let mut index = FlatIndex::new(dimension);
    index.add_batch(&ids, &vectors).unwrap();
    index
}

/// Benchmark the exact scan of one index.
fn bench_flat_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_search");
    group.sample_size(20);

    let dimension = 512;
    let query = generate_test_vectors(1, dimension).remove(0);

    // 10k crosses the parallel scan threshold.
    for count in [1_000, 10_000] {
        let index = build_index(count, dimension);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("top5", count), &index, |b, index| {
            b.iter(|| black_box(index.search(black_box(&query), 5).unwrap()))
        });
    }

    group.bench_function("add_batch_1000", |b| {
        let vectors = generate_test_vectors(1_000, dimension);
        let ids: Vec<i64> = (0..1_000).collect();
        b.iter_with_setup(
            || FlatIndex::new(dimension),
            |mut index| {
                index.add_batch(&ids, &vectors).unwrap();
                black_box(index)
            },
        )
    });

    group.finish();
}

/// Benchmark merging per-scope candidates into a global top-k.
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_k_merge");

    let mut rng = rand::rng();
    let scopes = 50;
    let per_scope = 100;
    let candidates: Vec<(Scope, Vec<(i64, f32)>)> = (0..scopes)
        .map(|s| {
            let mut local: Vec<(i64, f32)> = (0..per_scope)
                .map(|id| (id, rng.random_range(-1.0..1.0)))
                .collect();
            local.sort_by(|a, b| b.1.total_cmp(&a.1));
            (Scope::new(s % 7, s), local)
        })
        .collect();

    group.throughput(Throughput::Elements(scopes * per_scope as u64));
    for k in [5, 100] {
        group.bench_with_input(BenchmarkId::new("heap", k), &k, |b, &k| {
            b.iter(|| {
                let mut merger = TopKMerger::new(k);
                for (scope, local) in &candidates {
                    merger.extend_from_scope(*scope, local);
                }
                black_box(merger.into_sorted_vec())
            })
        });
    }

    // Baseline: collect everything and sort.
    group.bench_function("full_sort_k5", |b| {
        b.iter(|| {
            let mut all: Vec<SearchHit> = candidates
                .iter()
                .flat_map(|(scope, local)| {
                    local.iter().map(|&(id, score)| SearchHit::new(*scope, id, score))
                })
                .collect();
            all.sort_by(|a, b| a.rank_cmp(b));
            all.truncate(5);
            black_box(all)
        })
    });

    group.finish();
}

/// Benchmark the on-disk artifact codec.
fn bench_artifact_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("artifact_codec");
    group.sample_size(20);

    let index = build_index(5_000, 512);
    let bytes = to_bytes(&index).unwrap();
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(to_bytes(black_box(&index)).unwrap()))
    });
    group.bench_function("decode", |b| {
        b.iter(|| black_box(from_bytes(black_box(&bytes)).unwrap()))
    });

    group.finish();
}

/// Benchmark a federated query over cached scopes.
fn bench_federated_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("federated_search");
    group.sample_size(20);

    let dimension = 128;
    let config = PixdexConfig {
        dimension,
        cache_capacity: 64,
        ..PixdexConfig::default()
    };
    let service = SearchService::with_storage(
        config,
        Arc::new(MemoryStorage::new_default()),
        Arc::new(PrecomputedEmbedder::new(dimension)),
    )
    .unwrap();

    let mut owners = OwnerMap::new();
    let collections: Vec<u64> = (1..=32).collect();
    let ids: Vec<i64> = (0..500).collect();
    for &collection_id in &collections {
        let owner_id = collection_id % 4;
        owners.insert(collection_id, owner_id);
        service.create_scope(owner_id, collection_id).unwrap();
        let vectors = generate_test_vectors(ids.len(), dimension);
        service
            .ingest_vectors(owner_id, collection_id, &ids, &vectors)
            .unwrap();
    }
    let query = generate_test_vectors(1, dimension).remove(0);

    for fan_out in [4usize, 32] {
        group.throughput(Throughput::Elements((fan_out * ids.len()) as u64));
        group.bench_with_input(
            BenchmarkId::new("scopes", fan_out),
            &collections[..fan_out],
            |b, collections| {
                b.iter(|| {
                    black_box(
                        service
                            .search_vector(&query, collections, &owners, 10)
                            .unwrap(),
                    )
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_flat_search,
    bench_merge,
    bench_artifact_codec,
    bench_federated_search
);

criterion_main!(benches);
