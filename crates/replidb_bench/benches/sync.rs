//! Sync benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use replidb_bench::{populated_store, remote_docs};
use replidb_core::{new_replica_uid, DocumentStore};
use replidb_sync_engine::{
    sync_exchange, DocAtGen, ExchangeServer, LocalSyncTarget, LoopbackClient, StreamSyncTarget,
    Synchronizer,
};
use replidb_sync_protocol::{ExchangeDoc, ExchangeRequest, RequestHeader};
use std::sync::Arc;

/// Benchmark one exchange round receiving `count` documents.
fn bench_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_exchange");

    for count in [10, 100, 1000].iter() {
        let docs: Vec<DocAtGen> = remote_docs("source", *count, 128)
            .into_iter()
            .enumerate()
            .map(|(i, doc)| (doc, i as u64 + 1, format!("T-{i}")))
            .collect();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &docs, |b, docs| {
            b.iter(|| {
                let store = DocumentStore::open_in_memory("target").unwrap();
                let result =
                    sync_exchange(&store, docs, "source", 0, "", &mut |_, _, _| Ok(()), None)
                        .unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

/// Each session needs a target the source has never seen.
fn fresh_target() -> Arc<DocumentStore> {
    Arc::new(DocumentStore::open_in_memory(&new_replica_uid()).unwrap())
}

/// Benchmark a full session pushing to an empty replica.
fn bench_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");
    group.sample_size(20);

    for count in [100, 1000].iter() {
        let source = Arc::new(populated_store("source", *count, 128));
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("local", count), count, |b, _| {
            b.iter(|| {
                let target = fresh_target();
                let sync = Synchronizer::new(Arc::clone(&source), LocalSyncTarget::new(target));
                black_box(sync.sync().unwrap());
            });
        });

        group.bench_with_input(BenchmarkId::new("stream", count), count, |b, _| {
            b.iter(|| {
                let target = fresh_target();
                let server = Arc::new(ExchangeServer::new(target));
                let remote = StreamSyncTarget::new(LoopbackClient::new(server));
                let sync = Synchronizer::new(Arc::clone(&source), remote);
                black_box(sync.sync().unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark the sync stream codec.
fn bench_stream_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_codec");

    for count in [10, 1000].iter() {
        let request = ExchangeRequest {
            header: RequestHeader {
                source_replica_uid: "source".to_string(),
                last_known_generation: 0,
                last_known_trans_id: String::new(),
            },
            docs: (0..*count)
                .map(|i| ExchangeDoc {
                    id: format!("doc-{i}"),
                    rev: "source:1".to_string(),
                    content: Some(r#"{"payload":"abcdefghijklmnopqrstuvwxyz"}"#.to_string()),
                    gen: i as u64 + 1,
                    trans_id: format!("T-{i}"),
                })
                .collect(),
        };
        let encoded = request.to_stream().unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", count), &request, |b, request| {
            b.iter(|| black_box(request.to_stream().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", count), &encoded, |b, encoded| {
            b.iter(|| black_box(ExchangeRequest::from_stream(black_box(encoded)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_exchange, bench_session, bench_stream_codec);
criterion_main!(benches);
