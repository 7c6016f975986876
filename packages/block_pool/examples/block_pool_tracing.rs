//! Demonstrates emitting pool events via `tracing` and reporting them with `tracing-subscriber`.
//!
//! Run with `cargo run --example block_pool_tracing` to see a log line for every pool operation,
//! including the rejected invalid release at the end.

use std::thread;

use block_pool::{BlockPool, DropPolicy};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let pool = BlockPool::builder()
        .block_size(128)
        .pool_size(8)
        .drop_policy(DropPolicy::MustBeEmpty)
        .trace_events()
        .build()
        .unwrap();

    thread::scope(|scope| {
        for worker in 0..4_u8 {
            let pool = &pool;

            scope.spawn(move || {
                let mut block = pool.acquire_block().unwrap();
                block.fill(worker);
                pool.release_block(block).unwrap();
            });
        }
    });

    let address = pool.acquire_block().unwrap().into_raw();

    // SAFETY: The handle was consumed by into_raw() and the address is not used again.
    unsafe { pool.release_address(address) }.unwrap();

    // SAFETY: There is no handle for the block and nothing accesses its contents.
    let error = unsafe { pool.release_address(address) }.unwrap_err();
    println!("Second release was rejected: {error}");

    pool.destroy();
}
