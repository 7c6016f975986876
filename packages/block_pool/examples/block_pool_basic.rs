//! Basic usage example for `BlockPool`.
//!
//! This example reserves a small pool of message buffers, fills it until it is exhausted and
//! then returns a buffer so it can be handed out again.

use block_pool::{BlockPool, Error};

fn main() {
    // Four buffers of 64 bytes each, all reserved up front.
    let pool = BlockPool::new(64, 4).unwrap();

    println!("{}", pool.status());

    let mut buffers = Vec::new();

    for message in ["alpha", "beta", "gamma", "delta"] {
        let mut buffer = pool.acquire_block().unwrap();
        buffer[..message.len()].copy_from_slice(message.as_bytes());

        println!(
            "Stored {message:?} in block {} at offset {}",
            buffer.index(),
            buffer.offset()
        );

        buffers.push(buffer);
    }

    match pool.acquire_block() {
        Err(Error::PoolExhausted { pool_size }) => {
            println!("All {pool_size} blocks are in use, as expected");
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("the pool should be exhausted"),
    }

    // Return one buffer and take it again. With the default strategy we get the same block back.
    let returned = buffers.remove(1);
    let returned_index = returned.index();
    pool.release_block(returned).unwrap();

    let reused = pool.acquire_block().unwrap();
    println!(
        "Released block {returned_index} and acquired block {} in its place",
        reused.index()
    );

    // Previous contents are not cleared on release.
    let previous = String::from_utf8_lossy(&reused[..4]).into_owned();
    println!("Reused block still holds {previous:?}");

    buffers.push(reused);

    println!("{}", pool.status());

    for buffer in buffers {
        pool.release_block(buffer).unwrap();
    }

    println!("Released everything, pool is empty: {}", pool.is_empty());
}
