/// Determines which free block the pool hands out when a block is acquired.
///
/// The strategy never affects correctness - every strategy hands out each block to at most one
/// owner at a time. It only affects which block index a caller receives.
///
/// # Examples
///
/// ```
/// use block_pool::{AllocationStrategy, BlockPool};
///
/// let pool = BlockPool::builder()
///     .block_size(64)
///     .pool_size(4)
///     .allocation_strategy(AllocationStrategy::MostRecentlyReleased)
///     .build()
///     .unwrap();
///
/// let first = pool.acquire_block().unwrap();
/// let second = pool.acquire_block().unwrap();
/// let third = pool.acquire_block().unwrap();
/// let third_index = third.index();
///
/// pool.release_block(first).unwrap();
/// pool.release_block(third).unwrap();
///
/// // The block released last is the first to be reused, even though a lower index is free.
/// let reused = pool.acquire_block().unwrap();
/// assert_eq!(reused.index(), third_index);
/// assert_ne!(reused.index(), 0);
/// # pool.release_block(second).unwrap();
/// # pool.release_block(reused).unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum AllocationStrategy {
    /// Scans the occupancy map from index 0 upward and hands out the lowest-indexed free block.
    /// This is the default.
    ///
    /// The result is deterministic and keeps the used blocks packed at the start of the backing
    /// store. Acquisition costs O(pool size) in the worst case.
    #[default]
    FirstFit,

    /// Hands out the most recently released block first, falling back to never-used blocks in
    /// ascending index order.
    ///
    /// Recently released blocks are likely to still be in the processor caches. Acquisition
    /// costs O(1) at the price of one extra index per block of bookkeeping memory.
    MostRecentlyReleased,
}
