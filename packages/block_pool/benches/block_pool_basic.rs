//! Basic benchmarks for the `block_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use block_pool::{AllocationStrategy, BlockPool};
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const BLOCK_SIZE: usize = 64;
const POOL_SIZE: usize = 1024;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_pool_basic");

    group.bench_function("build", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(BlockPool::new(BLOCK_SIZE, POOL_SIZE).unwrap()));
            }

            start.elapsed()
        });
    });

    group.bench_function("acquire_one", |b| {
        b.iter_custom(|iters| {
            let pools = iter::repeat_with(|| BlockPool::new(BLOCK_SIZE, POOL_SIZE).unwrap())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &pools {
                // Dropping the handle leaves the block in use, which is fine for a throwaway pool.
                _ = black_box(pool.acquire_block().unwrap());
            }

            start.elapsed()
        });
    });

    group.bench_function("acquire_release_one", |b| {
        b.iter_custom(|iters| {
            let pool = BlockPool::new(BLOCK_SIZE, POOL_SIZE).unwrap();

            let start = Instant::now();

            for _ in 0..iters {
                let block = black_box(pool.acquire_block().unwrap());
                pool.release_block(block).unwrap();
            }

            start.elapsed()
        });
    });

    group.bench_function("write_one", |b| {
        b.iter_custom(|iters| {
            let pool = BlockPool::new(BLOCK_SIZE, POOL_SIZE).unwrap();
            let mut block = pool.acquire_block().unwrap();

            let start = Instant::now();

            for _ in 0..iters {
                block.fill(black_box(0xA5));
            }

            let elapsed = start.elapsed();

            pool.release_block(block).unwrap();

            elapsed
        });
    });

    group.finish();

    let mut group = c.benchmark_group("block_pool_slow");

    for (name, strategy) in [
        ("fill_and_drain_first_fit", AllocationStrategy::FirstFit),
        (
            "fill_and_drain_most_recently_released",
            AllocationStrategy::MostRecentlyReleased,
        ),
    ] {
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let pool = BlockPool::builder()
                    .block_size(BLOCK_SIZE)
                    .pool_size(POOL_SIZE)
                    .allocation_strategy(strategy)
                    .build()
                    .unwrap();

                let mut blocks = Vec::with_capacity(POOL_SIZE);

                let start = Instant::now();

                for _ in 0..iters {
                    while let Ok(block) = pool.acquire_block() {
                        blocks.push(block);
                    }

                    for block in blocks.drain(..) {
                        pool.release_block(block).unwrap();
                    }
                }

                start.elapsed()
            });
        });
    }

    group.bench_function("contended_acquire_release_4_threads", |b| {
        const THREADS: usize = 4;

        b.iter_custom(|iters| {
            let pool = BlockPool::new(BLOCK_SIZE, POOL_SIZE).unwrap();
            let barrier = Barrier::new(THREADS);

            let pool = &pool;
            let barrier = &barrier;

            thread::scope(|scope| {
                let handles = (0..THREADS)
                    .map(|_| {
                        scope.spawn(move || {
                            barrier.wait();

                            let start = Instant::now();

                            for _ in 0..iters {
                                let block = black_box(pool.acquire_block().unwrap());
                                pool.release_block(block).unwrap();
                            }

                            start.elapsed()
                        })
                    })
                    .collect::<Vec<_>>();

                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap())
                    .max()
                    .unwrap_or(Duration::ZERO)
            })
        });
    });

    group.finish();
}
