//! Worker pool throughput benchmark
//!
//! Measures submit → execute → report for batches of trivial jobs across
//! different worker counts and queue modes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use workpool::{Job, PoolConfig, QueueConfig, RetryPolicy, WorkerPool};

const JOBS_PER_ITER: u64 = 100;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Run `count` no-op jobs through `pool` and wait for every report
async fn run_batch(pool: &WorkerPool<u64>, count: u64) {
    let mut handles = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut job = Job::new(i).with_handler(|_| async { Ok(()) });
        handles.push(job.subscribe());
        pool.submit(job).await.unwrap();
    }
    for handle in handles {
        handle.wait().await.unwrap();
    }
}

/// Throughput with a blocking bounded queue at various worker counts
fn bench_bounded_throughput(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("pool/bounded");
    group.throughput(Throughput::Elements(JOBS_PER_ITER));

    for workers in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("workers", workers),
            &workers,
            |b, &workers| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let config =
                        PoolConfig::new(workers, RetryPolicy::no_retry(), QueueConfig::bounded(64));
                    let pool = WorkerPool::new(config).unwrap();

                    let start = Instant::now();
                    for _ in 0..iters {
                        run_batch(&pool, JOBS_PER_ITER).await;
                    }
                    let elapsed = start.elapsed();

                    pool.stop().await;
                    elapsed
                });
            },
        );
    }

    group.finish();
}

/// Throughput with an unbounded queue, where submit never waits
fn bench_unbounded_throughput(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("pool/unbounded");
    group.throughput(Throughput::Elements(JOBS_PER_ITER));

    for workers in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("workers", workers),
            &workers,
            |b, &workers| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let config =
                        PoolConfig::new(workers, RetryPolicy::no_retry(), QueueConfig::unbounded());
                    let pool = WorkerPool::new(config).unwrap();

                    let start = Instant::now();
                    for _ in 0..iters {
                        run_batch(&pool, JOBS_PER_ITER).await;
                    }
                    let elapsed = start.elapsed();

                    pool.stop().await;
                    elapsed
                });
            },
        );
    }

    group.finish();
}

/// Latency from submit to handler start, averaged over a batch
fn bench_submit_to_start(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("pool/submit_to_start");
    group.throughput(Throughput::Elements(1));

    for workers in [1usize, 8] {
        group.bench_with_input(
            BenchmarkId::new("workers", workers),
            &workers,
            |b, &workers| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let config =
                        PoolConfig::new(workers, RetryPolicy::no_retry(), QueueConfig::bounded(256));
                    let pool = WorkerPool::new(config).unwrap();
                    let total_latency = Arc::new(AtomicU64::new(0));
                    let origin = Instant::now();

                    let task_count = iters.max(1);
                    let mut handles = Vec::with_capacity(task_count as usize);
                    for _ in 0..task_count {
                        let submitted_at = origin.elapsed().as_micros() as u64;
                        let latency = Arc::clone(&total_latency);
                        let mut job = Job::new(submitted_at).with_handler(move |submitted_at| {
                            let latency = Arc::clone(&latency);
                            async move {
                                let started_at = origin.elapsed().as_micros() as u64;
                                latency.fetch_add(
                                    started_at.saturating_sub(submitted_at),
                                    Ordering::Relaxed,
                                );
                                Ok(())
                            }
                        });
                        handles.push(job.subscribe());
                        pool.submit(job).await.unwrap();
                    }

                    for handle in handles {
                        handle.wait().await.unwrap();
                    }
                    pool.stop().await;

                    let avg_latency_micros =
                        total_latency.load(Ordering::Relaxed) / task_count;
                    Duration::from_micros(avg_latency_micros.saturating_mul(iters))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_bounded_throughput,
    bench_unbounded_throughput,
    bench_submit_to_start,
);

criterion_main!(benches);
