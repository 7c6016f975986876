//! Integration tests for the `block_pool` package.
//!
//! These tests exercise the public API of `BlockPool` end to end, including capacity bounds,
//! rejection of invalid releases and concurrent use from multiple threads.

use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use block_pool::{
    AllocationStrategy, BlockPool, Error, EventSink, PoolEvent, PoolStatus, ReleaseFault,
};

/// Returns the byte offset of `address` from the first block of a pool, given the address of
/// that first block.
fn offset_from(base: NonNull<u8>, address: NonNull<u8>) -> usize {
    address.addr().get() - base.addr().get()
}

/// Captures every event for later inspection.
#[derive(Debug, Default)]
struct RecordingSink {
    events: Mutex<Vec<PoolEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<PoolEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &PoolEvent) {
        self.events.lock().unwrap().push(*event);
    }
}

#[test]
fn acquire_beyond_capacity_reports_exhaustion() {
    for pool_size in [1, 2, 7, 64] {
        let pool = BlockPool::new(16, pool_size).unwrap();

        let blocks = (0..pool_size)
            .map(|_| pool.acquire_block().unwrap())
            .collect::<Vec<_>>();

        let error = pool.acquire_block().unwrap_err();

        assert!(error.is_pool_exhausted());
        assert!(!error.is_caller_error());
        assert_eq!(pool.used_blocks(), pool_size);

        for block in blocks {
            pool.release_block(block).unwrap();
        }
    }
}

#[test]
fn acquire_release_round_trip_restores_state() {
    let pool = BlockPool::new(32, 4).unwrap();
    let before = pool.status();

    let block = pool.acquire_block().unwrap();
    let index = block.index();
    pool.release_block(block).unwrap();

    assert_eq!(pool.status(), before);

    let block = pool.acquire_block().unwrap();
    assert_eq!(block.index(), index);

    pool.release_block(block).unwrap();
}

#[test]
fn addresses_are_aligned_and_in_range() {
    const BLOCK_SIZE: usize = 48;
    const POOL_SIZE: usize = 10;

    let pool = BlockPool::new(BLOCK_SIZE, POOL_SIZE).unwrap();

    let blocks = (0..POOL_SIZE)
        .map(|_| pool.acquire_block().unwrap())
        .collect::<Vec<_>>();

    let base = blocks
        .iter()
        .find(|block| block.index() == 0)
        .unwrap()
        .as_ptr();

    for block in &blocks {
        let offset = offset_from(base, block.as_ptr());

        assert_eq!(offset % BLOCK_SIZE, 0);
        assert!(offset < BLOCK_SIZE * POOL_SIZE);
        assert_eq!(offset, block.offset());
        assert_eq!(block.as_ptr().addr().get() % pool.block_align(), 0);
        assert!(pool.contains(block.as_ptr().as_ptr()));
    }

    for block in blocks {
        pool.release_block(block).unwrap();
    }
}

#[test]
fn invalid_release_leaves_state_unchanged() {
    let pool = BlockPool::new(64, 4).unwrap();

    let kept = pool.acquire_block().unwrap();
    let released = pool.acquire_block().unwrap().into_raw();

    // SAFETY: The handle was consumed by into_raw() and the address is not used again.
    unsafe { pool.release_address(released) }.unwrap();

    let flags_before = (0..4)
        .map(|index| pool.is_block_in_use(index))
        .collect::<Vec<_>>();
    let status_before = pool.status();

    // Already free.
    // SAFETY: There is no handle for the block and nothing accesses its contents.
    let error = unsafe { pool.release_address(released) }.unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidRelease(ReleaseFault::AlreadyFree { index: 1 })
    ));
    assert!(error.is_caller_error());

    // Outside the backing store.
    let mut foreign = [0_u8; 64];
    // SAFETY: The address does not belong to the pool, so the pool never touches it.
    let error = unsafe { pool.release_address(NonNull::from(&mut foreign).cast()) }.unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidRelease(ReleaseFault::OutOfRange { .. })
    ));

    // Never acquired.
    let never_acquired = kept.as_ptr().as_ptr().wrapping_add(3 * 64);
    // SAFETY: There is no handle for the block and nothing accesses its contents.
    let error = unsafe { pool.release_address(NonNull::new(never_acquired).unwrap()) }.unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidRelease(ReleaseFault::AlreadyFree { index: 3 })
    ));

    let flags_after = (0..4)
        .map(|index| pool.is_block_in_use(index))
        .collect::<Vec<_>>();

    assert_eq!(flags_before, flags_after);
    assert_eq!(pool.status(), status_before);

    pool.release_block(kept).unwrap();
}

#[test]
fn exhaustion_and_drain_scenario() {
    let pool = BlockPool::new(64, 4).unwrap();

    let mut blocks = (0..4)
        .map(|_| pool.acquire_block().unwrap())
        .collect::<Vec<_>>();

    let distinct = blocks
        .iter()
        .map(|block| block.as_ptr())
        .collect::<HashSet<_>>();
    assert_eq!(distinct.len(), 4);
    assert_eq!(pool.used_blocks(), 4);

    assert!(matches!(
        pool.acquire_block(),
        Err(Error::PoolExhausted { pool_size: 4 })
    ));

    let released = blocks.remove(2);
    let released_index = released.index();
    let released_address = released.as_ptr();
    pool.release_block(released).unwrap();

    assert_eq!(pool.used_blocks(), 3);

    let reacquired = pool.acquire_block().unwrap();
    assert_eq!(reacquired.index(), released_index);
    assert_eq!(reacquired.as_ptr(), released_address);

    blocks.push(reacquired);

    for block in blocks {
        pool.release_block(block).unwrap();
    }

    assert!(pool.is_empty());
}

#[test]
fn zero_sizes_are_rejected() {
    assert!(matches!(
        BlockPool::new(0, 4),
        Err(Error::InvalidConfiguration { .. })
    ));
    assert!(matches!(
        BlockPool::new(64, 0),
        Err(Error::InvalidConfiguration { .. })
    ));
}

#[test]
fn unreasonable_size_is_rejected_without_allocating() {
    let result = BlockPool::new(usize::MAX / 4, 8);

    assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
}

#[test]
fn backing_store_larger_than_allocator_can_provide_is_out_of_memory() {
    // A valid layout that no real allocator can satisfy.
    let pool_size = usize::try_from(isize::MAX).unwrap();

    let error = BlockPool::new(1, pool_size).unwrap_err();

    assert!(matches!(
        error,
        Error::OutOfMemory {
            purpose: "backing store",
            ..
        }
    ));
    assert!(!error.is_caller_error());
    assert!(!error.is_pool_exhausted());
}

#[test]
fn status_display_is_human_readable() {
    let pool = BlockPool::new(64, 4).unwrap();
    let block = pool.acquire_block().unwrap();

    let status = pool.status();
    let rendered = status.to_string();

    assert!(rendered.contains("64 bytes"));
    assert!(rendered.contains("4 blocks"));
    assert!(rendered.contains("Used blocks: 1"));
    assert!(rendered.contains("Free blocks: 3"));

    pool.release_block(block).unwrap();
}

#[test]
fn status_counters_are_consistent() {
    let pool = BlockPool::new(8, 5).unwrap();

    let a = pool.acquire_block().unwrap();
    let b = pool.acquire_block().unwrap();

    let PoolStatus {
        block_size,
        pool_size,
        used_blocks,
        free_blocks,
        ..
    } = pool.status();

    assert_eq!(block_size, 8);
    assert_eq!(pool_size, 5);
    assert_eq!(used_blocks, 2);
    assert_eq!(free_blocks, 3);

    pool.release_block(a).unwrap();
    pool.release_block(b).unwrap();
}

#[test]
fn most_recently_released_strategy_reuses_hot_block() {
    let pool = BlockPool::builder()
        .block_size(64)
        .pool_size(4)
        .allocation_strategy(AllocationStrategy::MostRecentlyReleased)
        .build()
        .unwrap();

    let a = pool.acquire_block().unwrap();
    let b = pool.acquire_block().unwrap();
    let c = pool.acquire_block().unwrap();

    let a_index = a.index();
    let c_index = c.index();

    pool.release_block(a).unwrap();
    pool.release_block(c).unwrap();

    // First fit would return the block of `a` here.
    let reused = pool.acquire_block().unwrap();
    assert_eq!(reused.index(), c_index);

    let reused_again = pool.acquire_block().unwrap();
    assert_eq!(reused_again.index(), a_index);

    pool.release_block(b).unwrap();
    pool.release_block(reused).unwrap();
    pool.release_block(reused_again).unwrap();
}

#[test]
fn events_reach_injected_sink() {
    let sink = Arc::new(RecordingSink::default());
    let pool_sink = Arc::clone(&sink) as Arc<dyn EventSink>;

    let pool = BlockPool::builder()
        .block_size(16)
        .pool_size(1)
        .event_sink(pool_sink)
        .build()
        .unwrap();

    let block = pool.acquire_block().unwrap();
    pool.acquire_block().unwrap_err();
    pool.release_block(block).unwrap();

    let events = sink.events();

    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], PoolEvent::Created { .. }));
    assert!(matches!(
        events[1],
        PoolEvent::BlockAcquired {
            index: 0,
            used_blocks: 1,
            ..
        }
    ));
    assert!(matches!(events[2], PoolEvent::Exhausted { pool_size: 1, .. }));
    assert!(matches!(
        events[3],
        PoolEvent::BlockReleased {
            index: 0,
            used_blocks: 0,
            ..
        }
    ));

    pool.destroy();

    let events = sink.events();
    assert_eq!(events.len(), 5);
    assert!(matches!(
        events.last(),
        Some(PoolEvent::Destroyed { used_blocks: 0, .. })
    ));
}

#[test]
fn concurrent_acquire_never_aliases() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;
    const POOL_SIZE: usize = 4;

    let pool = BlockPool::new(64, POOL_SIZE).unwrap();
    let barrier = Barrier::new(THREADS);

    let pool = &pool;
    let barrier = &barrier;

    thread::scope(|scope| {
        for thread_index in 0..THREADS {
            scope.spawn(move || {
                let marker = u8::try_from(thread_index).unwrap();

                barrier.wait();

                for _ in 0..ROUNDS {
                    let Ok(mut block) = pool.acquire_block() else {
                        // The pool is smaller than the number of threads, so this is expected.
                        continue;
                    };

                    // If another thread owned the same block at the same time, it would
                    // overwrite our marker before we release the block.
                    block.fill(marker);
                    thread::yield_now();
                    assert!(block.iter().all(|byte| *byte == marker));

                    pool.release_block(block).unwrap();
                }
            });
        }
    });

    assert!(pool.is_empty());
}

#[test]
fn concurrent_fill_and_drain_hands_out_every_block_once() {
    const THREADS: usize = 4;
    const POOL_SIZE: usize = 64;

    let pool = BlockPool::new(16, POOL_SIZE).unwrap();
    let barrier = Barrier::new(THREADS);

    let pool = &pool;
    let barrier = &barrier;

    let indexes = thread::scope(|scope| {
        let handles = (0..THREADS)
            .map(|_| {
                scope.spawn(move || {
                    barrier.wait();

                    let mut acquired = Vec::new();

                    while let Ok(block) = pool.acquire_block() {
                        acquired.push(block);
                    }

                    acquired
                })
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    let unique = indexes
        .iter()
        .map(|block| block.index())
        .collect::<HashSet<_>>();

    assert_eq!(indexes.len(), POOL_SIZE);
    assert_eq!(unique.len(), POOL_SIZE);
    assert!(pool.is_full());

    for block in indexes {
        pool.release_block(block).unwrap();
    }

    assert!(pool.is_empty());
}

#[test]
fn pool_can_be_shared_via_arc() {
    let pool = Arc::new(BlockPool::new(32, 2).unwrap());

    let worker_pool = Arc::clone(&pool);
    let index = thread::spawn(move || {
        let block = worker_pool.acquire_block().unwrap();
        let index = block.index();
        worker_pool.release_block(block).unwrap();
        index
    })
    .join()
    .unwrap();

    assert_eq!(index, 0);
    assert!(pool.is_empty());
}
