use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::{
    AllocationStrategy, BackingStore, Block, BlockPoolBuilder, DropPolicy, Error, EventSink,
    Occupancy, PoolEvent, PoolLayout, PoolStatus, ReleaseFault, Result,
};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique pool ID.
fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A thread-safe pool of equally sized memory blocks, all carved from one backing store that
/// is reserved when the pool is created.
///
/// Callers [acquire][Self::acquire_block] a block, use its bytes through the returned
/// [`Block`] handle and [release][Self::release_block] it when done, after which the block can
/// be handed out again. The pool never grows, so acquisition fails with
/// [`Error::PoolExhausted`] once every block is in use.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
///
/// let pool = BlockPool::new(64, 4).unwrap();
///
/// let mut block = pool.acquire_block().unwrap();
/// block[0] = 42;
/// assert_eq!(pool.used_blocks(), 1);
///
/// pool.release_block(block).unwrap();
/// assert_eq!(pool.used_blocks(), 0);
/// ```
///
/// # Block selection
///
/// By default the pool hands out the lowest-indexed free block, which makes the result
/// deterministic for a single thread. See [`AllocationStrategy`] for alternatives.
///
/// # Thread safety
///
/// The pool is thread-safe ([`Send`] + [`Sync`]). All threads share one lock that is held for
/// the duration of the block selection and the flag update. The lock provides mutual exclusion
/// but no fairness - when several threads race to acquire, which of them gets the lower index
/// is unspecified.
///
/// The pool guarantees that each block has at most one owner at a time. It does not
/// synchronize access to block contents - that is governed by Rust's borrowing rules applied
/// to the [`Block`] handle.
///
/// # Destruction
///
/// The pool is destroyed when it is dropped (or via [`destroy()`](Self::destroy)). Because
/// [`Block`] handles borrow the pool, the compiler rejects any attempt to destroy a pool while
/// handles to its blocks are still alive. Addresses obtained via [`Block::into_raw()`] are not
/// tracked this way and become dangling. The [`DropPolicy`] decides whether destroying a pool
/// with blocks still in use is acceptable.
#[derive(Debug)]
pub struct BlockPool {
    /// We need to uniquely identify each pool to ensure that handles are not returned to the
    /// wrong pool.
    pool_id: u64,

    layout: PoolLayout,

    /// The guard around the occupancy map. Every read or write of the occupancy flags and the
    /// used block counter happens under this lock.
    ///
    /// Declared before the backing store, so the guard and occupancy map are torn down first.
    guard: Mutex<Occupancy>,

    backing: BackingStore,

    drop_policy: DropPolicy,

    event_sink: Arc<dyn EventSink>,
}

impl BlockPool {
    /// Creates a builder for configuring and constructing a [`BlockPool`].
    ///
    /// You must specify the block size and the pool size before calling `.build()`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::builder()
    ///     .block_size(64)
    ///     .pool_size(4)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(pool.free_blocks(), 4);
    /// ```
    #[inline]
    pub fn builder() -> BlockPoolBuilder {
        BlockPoolBuilder::new()
    }

    /// Creates a pool of `pool_size` blocks of `block_size` bytes each, with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either size is zero or if the pool would not
    /// fit in the address space.
    ///
    /// Returns [`Error::OutOfMemory`] if the memory for the pool cannot be reserved.
    pub fn new(block_size: usize, pool_size: usize) -> Result<Self> {
        Self::builder()
            .block_size(block_size)
            .pool_size(pool_size)
            .build()
    }

    /// Creates a new [`BlockPool`] from a validated configuration.
    ///
    /// This method is used internally by the builder to construct the actual pool.
    pub(crate) fn new_inner(
        layout: PoolLayout,
        allocation_strategy: AllocationStrategy,
        drop_policy: DropPolicy,
        event_sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let backing = BackingStore::new(layout)?;

        // If this fails, the backing store is released again as it goes out of scope.
        let occupancy = Occupancy::new(layout.pool_size(), allocation_strategy)?;

        let pool = Self {
            pool_id: generate_pool_id(),
            layout,
            guard: Mutex::new(occupancy),
            backing,
            drop_policy,
            event_sink,
        };

        pool.event_sink.record(&PoolEvent::Created {
            pool_id: pool.pool_id,
            block_size: layout.block_size().get(),
            pool_size: layout.pool_size().get(),
        });

        Ok(pool)
    }

    /// The size of each block in bytes.
    #[must_use]
    #[inline]
    pub fn block_size(&self) -> usize {
        self.layout.block_size().get()
    }

    /// The total number of blocks in the pool, whether in use or not.
    #[must_use]
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.layout.pool_size().get()
    }

    /// The alignment of the first byte of every block.
    #[must_use]
    #[inline]
    pub fn block_align(&self) -> usize {
        self.layout.block_align()
    }

    /// The number of blocks currently in use.
    #[must_use]
    pub fn used_blocks(&self) -> usize {
        self.guard.lock().used_blocks()
    }

    /// The number of blocks currently available for acquisition.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.status().free_blocks
    }

    /// Whether every block of the pool is in use.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.used_blocks() == self.pool_size()
    }

    /// Whether no block of the pool is in use.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used_blocks() == 0
    }

    /// Takes a consistent snapshot of the block counters of the pool.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::new(64, 4).unwrap();
    ///
    /// let status = pool.status();
    /// assert_eq!(status.block_size, 64);
    /// assert_eq!(status.pool_size, 4);
    /// assert_eq!(status.used_blocks, 0);
    /// assert_eq!(status.free_blocks, 4);
    /// ```
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let used_blocks = self.guard.lock().used_blocks();

        PoolStatus::new(self.block_size(), self.pool_size(), used_blocks)
    }

    /// Whether the block at `index` is currently in use.
    ///
    /// Returns `false` for indexes beyond the end of the pool.
    #[must_use]
    pub fn is_block_in_use(&self, index: usize) -> bool {
        self.guard.lock().is_used(index)
    }

    /// Whether `address` points anywhere into the backing store of this pool.
    ///
    /// This does not say anything about whether the block containing the address is in use.
    #[must_use]
    pub fn contains(&self, address: *const u8) -> bool {
        self.backing.contains(address)
    }

    /// Acquires a free block and returns an exclusive handle to it.
    ///
    /// Which block is selected depends on the [`AllocationStrategy`] of the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if every block is in use. The pool is not modified in
    /// that case and the caller may try again later.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::new(64, 1).unwrap();
    ///
    /// let block = pool.acquire_block().unwrap();
    /// assert!(pool.acquire_block().unwrap_err().is_pool_exhausted());
    ///
    /// pool.release_block(block).unwrap();
    /// ```
    pub fn acquire_block(&self) -> Result<Block<'_>> {
        let acquired = {
            let mut occupancy = self.guard.lock();

            occupancy
                .acquire()
                .map(|index| (index, occupancy.used_blocks()))
        };

        let Some((index, used_blocks)) = acquired else {
            self.event_sink.record(&PoolEvent::Exhausted {
                pool_id: self.pool_id,
                pool_size: self.pool_size(),
            });

            return Err(Error::PoolExhausted {
                pool_size: self.pool_size(),
            });
        };

        self.event_sink.record(&PoolEvent::BlockAcquired {
            pool_id: self.pool_id,
            index,
            used_blocks,
        });

        Ok(Block::new(
            self.pool_id,
            index,
            self.backing.block_ptr(index),
            self.layout.block_size(),
        ))
    }

    /// Releases a block back to the pool, consuming its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRelease`] with [`ReleaseFault::ForeignBlock`] if the handle was
    /// issued by a different pool. Neither pool is modified in that case and the block stays in
    /// use in the pool that issued it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::new(64, 4).unwrap();
    ///
    /// let block = pool.acquire_block().unwrap();
    /// pool.release_block(block).unwrap();
    ///
    /// assert!(pool.is_empty());
    /// ```
    pub fn release_block(&self, block: Block<'_>) -> Result<()> {
        if block.pool_id() != self.pool_id {
            return Err(self.reject_release(ReleaseFault::ForeignBlock {
                index: block.index(),
            }));
        }

        self.release_index(block.index())
    }

    /// Releases the block that starts at `address` back to the pool.
    ///
    /// This is the counterpart to [`Block::into_raw()`] for callers that track blocks by
    /// address instead of by handle. The address is validated before the pool is modified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRelease`] without modifying the pool if:
    ///
    /// * the address does not point into the backing store of this pool
    ///   ([`ReleaseFault::OutOfRange`]);
    /// * the address does not point at the first byte of a block ([`ReleaseFault::Misaligned`]);
    /// * the block is not in use, e.g. because it was already released
    ///   ([`ReleaseFault::AlreadyFree`]).
    ///
    /// # Safety
    ///
    /// The caller must guarantee that no [`Block`] handle for the block at `address` is alive
    /// and that the block contents are not accessed via `address` after this call returns.
    ///
    /// # Example
    ///
    /// ```rust
    /// use block_pool::BlockPool;
    ///
    /// let pool = BlockPool::new(64, 4).unwrap();
    ///
    /// let address = pool.acquire_block().unwrap().into_raw();
    ///
    /// // SAFETY: The handle was consumed by into_raw() and the address is not used again.
    /// unsafe { pool.release_address(address) }.unwrap();
    ///
    /// // Releasing the same block twice is detected.
    /// // SAFETY: There is no handle for the block and nothing accesses its contents.
    /// assert!(unsafe { pool.release_address(address) }.is_err());
    /// ```
    pub unsafe fn release_address(&self, address: NonNull<u8>) -> Result<()> {
        match self.backing.index_of(address) {
            Ok(index) => self.release_index(index),
            Err(fault) => Err(self.reject_release(fault)),
        }
    }

    /// Destroys the pool, releasing its backing store.
    ///
    /// This is equivalent to dropping the pool.
    ///
    /// # Panics
    ///
    /// Panics if the drop policy is [`DropPolicy::MustBeEmpty`] and blocks are still in use.
    pub fn destroy(self) {
        drop(self);
    }

    fn release_index(&self, index: usize) -> Result<()> {
        let released = {
            let mut occupancy = self.guard.lock();

            occupancy
                .release(index)
                .map(|()| occupancy.used_blocks())
        };

        match released {
            Ok(used_blocks) => {
                self.event_sink.record(&PoolEvent::BlockReleased {
                    pool_id: self.pool_id,
                    index,
                    used_blocks,
                });

                Ok(())
            }
            Err(fault) => Err(self.reject_release(fault)),
        }
    }

    fn reject_release(&self, fault: ReleaseFault) -> Error {
        self.event_sink.record(&PoolEvent::InvalidRelease {
            pool_id: self.pool_id,
            fault,
        });

        Error::InvalidRelease(fault)
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        let used_blocks = self.guard.get_mut().used_blocks();

        self.event_sink.record(&PoolEvent::Destroyed {
            pool_id: self.pool_id,
            used_blocks,
        });

        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if !thread::panicking() && matches!(self.drop_policy, DropPolicy::MustBeEmpty) {
            assert!(
                used_blocks == 0,
                "destroyed a block pool with {used_blocks} blocks still in use - this is forbidden by DropPolicy::MustBeEmpty"
            );
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "test code doesn't need the same safety rigor as production code"
)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;
    use std::sync::Barrier;

    use mockall::Sequence;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::MockEventSink;

    assert_impl_all!(BlockPool: Send, Sync, std::fmt::Debug);

    fn pool_with_sink(block_size: usize, pool_size: usize, sink: MockEventSink) -> BlockPool {
        BlockPool::builder()
            .block_size(block_size)
            .pool_size(pool_size)
            .event_sink(Arc::new(sink))
            .build()
            .unwrap()
    }

    #[test]
    fn smoke_test() {
        let pool = BlockPool::new(64, 4).unwrap();

        let mut a = pool.acquire_block().unwrap();
        let mut b = pool.acquire_block().unwrap();

        a.fill(1);
        b.fill(2);

        assert!(a.iter().all(|byte| *byte == 1));
        assert!(b.iter().all(|byte| *byte == 2));
        assert_eq!(pool.used_blocks(), 2);
        assert_eq!(pool.free_blocks(), 2);

        pool.release_block(a).unwrap();
        pool.release_block(b).unwrap();

        assert!(pool.is_empty());
    }

    #[test]
    fn acquire_uses_first_fit() {
        let pool = BlockPool::new(16, 4).unwrap();

        let blocks = (0..4)
            .map(|_| pool.acquire_block().unwrap())
            .collect::<Vec<_>>();

        for (expected_index, block) in blocks.iter().enumerate() {
            assert_eq!(block.index(), expected_index);
        }

        for block in blocks {
            pool.release_block(block).unwrap();
        }
    }

    #[test]
    fn exhaustion_leaves_state_unchanged() {
        let pool = BlockPool::new(16, 2).unwrap();

        let a = pool.acquire_block().unwrap();
        let b = pool.acquire_block().unwrap();

        let error = pool.acquire_block().unwrap_err();

        assert!(matches!(error, Error::PoolExhausted { pool_size: 2 }));
        assert!(pool.is_full());
        assert_eq!(pool.used_blocks(), 2);

        pool.release_block(a).unwrap();
        pool.release_block(b).unwrap();
    }

    #[test]
    fn foreign_block_is_rejected() {
        let pool_a = BlockPool::new(16, 2).unwrap();
        let pool_b = BlockPool::new(16, 2).unwrap();

        let block = pool_a.acquire_block().unwrap();

        let error = pool_b.release_block(block).unwrap_err();

        assert!(matches!(
            error,
            Error::InvalidRelease(ReleaseFault::ForeignBlock { index: 0 })
        ));

        // The block remains in use in the pool that issued it.
        assert_eq!(pool_a.used_blocks(), 1);
        assert_eq!(pool_b.used_blocks(), 0);
    }

    #[test]
    fn release_address_of_foreign_address_is_rejected() {
        let pool = BlockPool::new(16, 2).unwrap();
        let block = pool.acquire_block().unwrap();

        let mut local = [0_u8; 16];
        let foreign = NonNull::from(&mut local).cast::<u8>();

        let error = unsafe { pool.release_address(foreign) }.unwrap_err();

        assert!(matches!(
            error,
            Error::InvalidRelease(ReleaseFault::OutOfRange { .. })
        ));
        assert_eq!(pool.used_blocks(), 1);

        pool.release_block(block).unwrap();
    }

    #[test]
    fn release_address_mid_block_is_rejected() {
        let pool = BlockPool::new(16, 2).unwrap();
        let address = pool.acquire_block().unwrap().into_raw();

        let mid_block = unsafe { address.add(1) };
        let error = unsafe { pool.release_address(mid_block) }.unwrap_err();

        assert!(matches!(
            error,
            Error::InvalidRelease(ReleaseFault::Misaligned { offset: 1, .. })
        ));
        assert_eq!(pool.used_blocks(), 1);

        unsafe { pool.release_address(address) }.unwrap();
    }

    #[test]
    fn contains_matches_backing_range() {
        let pool = BlockPool::new(16, 2).unwrap();
        let block = pool.acquire_block().unwrap();

        assert!(pool.contains(block.as_ptr().as_ptr()));
        assert!(pool.contains(block.as_ptr().as_ptr().wrapping_add(31)));
        assert!(!pool.contains(block.as_ptr().as_ptr().wrapping_add(32)));

        pool.release_block(block).unwrap();
    }

    #[test]
    fn events_are_recorded_in_order() {
        let mut sink = MockEventSink::new();
        let mut seq = Sequence::new();

        sink.expect_record()
            .withf(|event| {
                matches!(
                    event,
                    PoolEvent::Created {
                        block_size: 8,
                        pool_size: 1,
                        ..
                    }
                )
            })
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        sink.expect_record()
            .withf(|event| {
                matches!(
                    event,
                    PoolEvent::BlockAcquired {
                        index: 0,
                        used_blocks: 1,
                        ..
                    }
                )
            })
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        sink.expect_record()
            .withf(|event| matches!(event, PoolEvent::Exhausted { pool_size: 1, .. }))
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        sink.expect_record()
            .withf(|event| {
                matches!(
                    event,
                    PoolEvent::BlockReleased {
                        index: 0,
                        used_blocks: 0,
                        ..
                    }
                )
            })
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        sink.expect_record()
            .withf(|event| {
                matches!(
                    event,
                    PoolEvent::InvalidRelease {
                        fault: ReleaseFault::AlreadyFree { index: 0 },
                        ..
                    }
                )
            })
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        sink.expect_record()
            .withf(|event| matches!(event, PoolEvent::Destroyed { used_blocks: 0, .. }))
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        let pool = pool_with_sink(8, 1, sink);

        let address = pool.acquire_block().unwrap().into_raw();
        pool.acquire_block().unwrap_err();

        unsafe { pool.release_address(address) }.unwrap();
        unsafe { pool.release_address(address) }.unwrap_err();

        pool.destroy();
    }

    #[test]
    fn pool_ids_are_unique() {
        let pool_a = BlockPool::new(8, 1).unwrap();
        let pool_b = BlockPool::new(8, 1).unwrap();

        assert_ne!(pool_a.pool_id, pool_b.pool_id);
    }

    #[test]
    fn destroy_with_blocks_in_use_is_allowed_by_default() {
        let pool = BlockPool::new(8, 2).unwrap();

        let _address = pool.acquire_block().unwrap().into_raw();

        pool.destroy();
    }

    #[test]
    #[should_panic]
    fn destroy_with_blocks_in_use_panics_when_must_be_empty() {
        let pool = BlockPool::builder()
            .block_size(8)
            .pool_size(2)
            .drop_policy(DropPolicy::MustBeEmpty)
            .build()
            .unwrap();

        let _address = pool.acquire_block().unwrap().into_raw();

        pool.destroy();
    }

    #[test]
    fn destroy_empty_pool_is_fine_when_must_be_empty() {
        let pool = BlockPool::builder()
            .block_size(8)
            .pool_size(2)
            .drop_policy(DropPolicy::MustBeEmpty)
            .build()
            .unwrap();

        let block = pool.acquire_block().unwrap();
        pool.release_block(block).unwrap();

        pool.destroy();
    }

    #[test]
    fn concurrent_acquire_hands_out_distinct_blocks() {
        const THREADS: usize = 8;
        const BLOCKS_PER_THREAD: usize = 16;

        let pool = BlockPool::new(32, THREADS * BLOCKS_PER_THREAD).unwrap();
        let barrier = Barrier::new(THREADS);

        let pool = &pool;
        let barrier = &barrier;

        let addresses = thread::scope(|scope| {
            let handles = (0..THREADS)
                .map(|_| {
                    scope.spawn(move || {
                        barrier.wait();

                        (0..BLOCKS_PER_THREAD)
                            .map(|_| pool.acquire_block().unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .map(|block| block.into_raw())
                .collect::<Vec<_>>()
        });

        let unique = addresses.iter().copied().collect::<HashSet<_>>();

        assert_eq!(unique.len(), THREADS * BLOCKS_PER_THREAD);
        assert!(pool.is_full());
    }
}
