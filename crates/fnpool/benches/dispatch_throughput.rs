//! Dispatch throughput benchmark
//!
//! Measures the full round trip: dispatch → worker execution → future settled.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use tokio::runtime::Runtime;

use fnpool::Pool;

fn checksum(data: Vec<u8>) -> Result<u64, String> {
    Ok(data.iter().map(|&b| b as u64).sum())
}

/// One call at a time; measures per-call overhead on a warm worker
fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = Pool::new(checksum, 1).unwrap();
    let data = vec![7u8; 64];

    let mut group = c.benchmark_group("dispatch/round_trip");
    group.throughput(Throughput::Elements(1));
    group.bench_function("64_bytes", |b| {
        b.to_async(&rt).iter(|| async {
            pool.dispatch(&data).await.unwrap();
        });
    });
    group.finish();

    pool.dispose();
}

/// Batches larger than the pool; exercises the FIFO queue
fn bench_saturated(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let batch: u64 = 256;
    let data = vec![1u8; 1024];

    let mut group = c.benchmark_group("dispatch/saturated");
    group.throughput(Throughput::Elements(batch));
    group.sample_size(20);

    for size in [1, 2, 4, 8] {
        let pool = Pool::new(checksum, size).unwrap();
        group.bench_with_input(BenchmarkId::new("workers", size), &size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let handles: Vec<_> = (0..batch).map(|_| pool.dispatch(&data)).collect();
                for result in join_all(handles).await {
                    result.unwrap();
                }
            });
        });
        pool.dispose();
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_saturated);

criterion_main!(benches);
