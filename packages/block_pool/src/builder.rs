use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{
    AllocationStrategy, BlockPool, DropPolicy, Error, EventSink, NoopEventSink, PoolLayout,
    Result, TracingEventSink,
};

/// Builder for creating an instance of [`BlockPool`].
///
/// The block size and the pool size are mandatory, whereas other settings are optional.
/// Invalid settings are reported as [`Error::InvalidConfiguration`] by [`build()`](Self::build).
///
/// # Examples
///
/// ```
/// use block_pool::{AllocationStrategy, BlockPool, DropPolicy};
///
/// let pool = BlockPool::builder()
///     .block_size(256)
///     .pool_size(1024)
///     .block_align(64)
///     .allocation_strategy(AllocationStrategy::MostRecentlyReleased)
///     .drop_policy(DropPolicy::MustBeEmpty)
///     .trace_events()
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.block_size(), 256);
/// assert_eq!(pool.pool_size(), 1024);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) and can be safely transferred between threads,
/// allowing pool configuration to happen on different threads than where the pool is used.
/// However, it is not thread-safe ([`Sync`]) as it contains mutable configuration state.
#[derive(Debug)]
#[must_use]
pub struct BlockPoolBuilder {
    block_size: Option<usize>,
    pool_size: Option<usize>,
    block_align: Option<usize>,
    allocation_strategy: AllocationStrategy,
    drop_policy: DropPolicy,
    event_sink: Arc<dyn EventSink>,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe
    _not_sync: PhantomData<Cell<()>>,
}

impl BlockPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            block_size: None,
            pool_size: None,
            block_align: None,
            allocation_strategy: AllocationStrategy::default(),
            drop_policy: DropPolicy::default(),
            event_sink: Arc::new(NoopEventSink),
            _not_sync: PhantomData,
        }
    }

    /// Sets the size of each block in bytes. Must be greater than zero.
    #[inline]
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Sets the number of blocks in the pool. Must be greater than zero.
    ///
    /// The pool reserves memory for all of its blocks when it is built and never grows.
    #[inline]
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = Some(pool_size);
        self
    }

    /// Sets the alignment of the first byte of every block.
    ///
    /// Must be a power of two that divides the block size. If not set, the largest power of two
    /// that divides the block size is used, up to a maximum of 16.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::BlockPool;
    ///
    /// // Cache line aligned blocks.
    /// let pool = BlockPool::builder()
    ///     .block_size(128)
    ///     .pool_size(8)
    ///     .block_align(64)
    ///     .build()
    ///     .unwrap();
    ///
    /// let block = pool.acquire_block().unwrap();
    /// assert_eq!(block.as_ptr().addr().get() % 64, 0);
    /// # pool.release_block(block).unwrap();
    /// ```
    #[inline]
    pub fn block_align(mut self, block_align: usize) -> Self {
        self.block_align = Some(block_align);
        self
    }

    /// Sets the [allocation strategy][AllocationStrategy] that decides which free block is
    /// handed out next.
    #[inline]
    pub fn allocation_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.allocation_strategy = strategy;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat blocks that
    /// are still in use when the pool is destroyed.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Sets the sink that receives the [events][crate::PoolEvent] of the pool.
    ///
    /// By default, events are discarded by a [`NoopEventSink`].
    #[inline]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Emits the events of the pool via the [`tracing`] crate, using a [`TracingEventSink`].
    #[inline]
    pub fn trace_events(self) -> Self {
        self.event_sink(Arc::new(TracingEventSink))
    }

    /// Builds the block pool with the specified configuration, reserving the memory for all
    /// of its blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the block size or pool size is missing or
    /// zero, if the block alignment is invalid or if the pool would not fit in the address space.
    ///
    /// Returns [`Error::OutOfMemory`] if the memory for the pool cannot be reserved.
    pub fn build(self) -> Result<BlockPool> {
        let block_size = self.block_size.ok_or_else(|| Error::InvalidConfiguration {
            problem: "block size must be set using .block_size() before calling .build()"
                .to_string(),
        })?;

        let pool_size = self.pool_size.ok_or_else(|| Error::InvalidConfiguration {
            problem: "pool size must be set using .pool_size() before calling .build()"
                .to_string(),
        })?;

        let layout = PoolLayout::calculate(block_size, pool_size, self.block_align)?;

        BlockPool::new_inner(
            layout,
            self.allocation_strategy,
            self.drop_policy,
            self.event_sink,
        )
    }
}
