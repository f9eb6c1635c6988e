//! Criterion benchmark for checkout/release throughput under contention.
//!
//! Each iteration fans `concurrency` tasks out over a shared pool backed by
//! the in-memory driver, so the numbers measure pool overhead only: the
//! priority gate, deadpool's idle queue, and the liveness probe.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rpool::test_utils::MemoryDriver;
use rpool::{Pool, RpoolError, RunOptions};
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

const ENDPOINTS: [&str; 3] = [
    "rethinkdb://bench-a:28015/bench",
    "rethinkdb://bench-b:28015/bench",
    "rethinkdb://bench-c:28015/bench",
];
const CHECKOUTS_PER_TASK: usize = 32;

static TOKIO_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("create tokio runtime"));

static BENCH_CONCURRENCY: LazyLock<usize> = LazyLock::new(|| {
    std::env::var("BENCH_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(16)
});

fn build_pool(max: usize) -> Pool<MemoryDriver> {
    TOKIO_RUNTIME.block_on(async {
        Pool::builder(MemoryDriver::new(), ENDPOINTS.to_vec())
            .name("bench")
            .max(max)
            .min(max)
            .build()
            .await
            .expect("build bench pool")
    })
}

async fn parallel_checkout(pool: &Pool<MemoryDriver>, concurrency: usize) -> Result<(), RpoolError> {
    let mut tasks = JoinSet::new();
    for _ in 0..concurrency {
        let pool = pool.clone();
        tasks.spawn(async move {
            for _ in 0..CHECKOUTS_PER_TASK {
                pool.acquire().await?.release();
            }
            Ok::<(), RpoolError>(())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| RpoolError::Other(e.to_string()))??;
    }
    Ok(())
}

async fn parallel_run(pool: &Pool<MemoryDriver>, concurrency: usize) -> Result<(), RpoolError> {
    let driver = pool.driver().clone();
    let units = (0..concurrency * CHECKOUTS_PER_TASK).map(|i| driver.expr(i));
    pool.run_all(units, &RunOptions::new()).await.map(|_| ())
}

fn benchmark_checkout(
    group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>,
    max: usize,
) {
    let runtime = &*TOKIO_RUNTIME;
    let concurrency = *BENCH_CONCURRENCY;
    let pool = build_pool(max);

    group.bench_function(
        BenchmarkId::new(format!("acquire_release_max{max}"), concurrency),
        |b| {
            let pool = pool.clone();
            b.to_async(runtime).iter_custom(move |iters| {
                let pool = pool.clone();
                async move {
                    let mut total = Duration::default();
                    for _ in 0..iters {
                        let start = Instant::now();
                        parallel_checkout(&pool, concurrency)
                            .await
                            .expect("parallel checkout");
                        total += start.elapsed();
                    }
                    total
                }
            });
        },
    );

    runtime.block_on(pool.drain());
}

fn benchmark_run_all(group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    let runtime = &*TOKIO_RUNTIME;
    let concurrency = *BENCH_CONCURRENCY;
    let pool = build_pool(concurrency);

    group.bench_function(BenchmarkId::new("run_all", concurrency), |b| {
        let pool = pool.clone();
        b.to_async(runtime).iter_custom(move |iters| {
            let pool = pool.clone();
            async move {
                let mut total = Duration::default();
                for _ in 0..iters {
                    let start = Instant::now();
                    parallel_run(&pool, concurrency).await.expect("run_all batch");
                    total += start.elapsed();
                }
                total
            }
        });
    });

    runtime.block_on(pool.drain());
}

fn pool_checkout(c: &mut Criterion) {
    let concurrency = *BENCH_CONCURRENCY;
    let mut group = c.benchmark_group("pool_checkout");
    group.throughput(Throughput::Elements((concurrency * CHECKOUTS_PER_TASK) as u64));

    // uncontended: one connection per task
    benchmark_checkout(&mut group, concurrency);
    // contended: tasks queue on the priority gate
    benchmark_checkout(&mut group, (concurrency / 4).max(1));
    benchmark_run_all(&mut group);

    group.finish();
}

criterion_group!(benches, pool_checkout);
criterion_main!(benches);
