//! Document store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use replidb_bench::{populated_store, random_content, remote_docs};
use replidb_core::{DocumentStore, SourceInfo, StoreConfig};
use tempfile::TempDir;

/// Benchmark local document creation.
fn bench_create_doc(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_doc");

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let store = DocumentStore::open_in_memory("bench").unwrap();
            let content = random_content(size);
            b.iter(|| {
                let doc = store.create_doc(black_box(content.clone())).unwrap();
                black_box(doc);
            });
        });
    }

    group.finish();
}

/// Benchmark durable writes to a file-backed store.
fn bench_file_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_put");
    group.sample_size(20);

    for sync_on_write in [false, true] {
        group.bench_with_input(
            BenchmarkId::from_parameter(if sync_on_write { "sync" } else { "no_sync" }),
            &sync_on_write,
            |b, &sync_on_write| {
                let temp_dir = TempDir::new().unwrap();
                let store = DocumentStore::open_file(
                    &temp_dir.path().join("bench.replidb"),
                    StoreConfig::new().sync_on_write(sync_on_write),
                )
                .unwrap();
                let content = random_content(256);
                b.iter(|| {
                    let doc = store.create_doc(black_box(content.clone())).unwrap();
                    black_box(doc);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark applying synced documents.
fn bench_put_doc_if_newer(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_doc_if_newer");

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("inserted", count), count, |b, &count| {
            let docs = remote_docs("remote", count, 128);
            b.iter(|| {
                let store = DocumentStore::open_in_memory("bench").unwrap();
                for (i, doc) in docs.iter().enumerate() {
                    let source = SourceInfo::new("remote", i as u64 + 1, format!("T-{i}"));
                    black_box(store.put_doc_if_newer(doc, false, Some(&source)).unwrap());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("superseded", count), count, |b, &count| {
            let docs = remote_docs("remote", count, 128);
            let store = DocumentStore::open_in_memory("bench").unwrap();
            for doc in &docs {
                store.put_doc_if_newer(doc, false, None).unwrap();
            }
            b.iter(|| {
                for doc in &docs {
                    black_box(store.put_doc_if_newer(doc, false, None).unwrap());
                }
            });
        });
    }

    group.finish();
}

/// Benchmark change detection.
fn bench_whats_changed(c: &mut Criterion) {
    let mut group = c.benchmark_group("whats_changed");

    for count in [100, 1000, 10_000].iter() {
        let store = populated_store("bench", *count, 32);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                let changed = store.whats_changed(black_box(0));
                black_box(changed);
            });
        });
    }

    group.finish();
}

/// Benchmark replaying the log on open.
fn bench_reopen(c: &mut Criterion) {
    let mut group = c.benchmark_group("reopen");
    group.sample_size(20);

    for count in [100, 1000].iter() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bench.replidb");
        {
            let store =
                DocumentStore::open_file(&path, StoreConfig::new().sync_on_write(false)).unwrap();
            for _ in 0..*count {
                store.create_doc(random_content(128)).unwrap();
            }
            store.flush().unwrap();
        }

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                let store = DocumentStore::open_file(&path, StoreConfig::new()).unwrap();
                black_box(store.generation());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_create_doc,
    bench_file_put,
    bench_put_doc_if_newer,
    bench_whats_changed,
    bench_reopen,
);

criterion_main!(benches);
