/// Determines how the pool treats blocks that are still in use when the pool is destroyed.
///
/// By default, the pool silently reclaims the memory of any blocks still in use.
///
/// # Examples
///
/// ```
/// use block_pool::{BlockPool, DropPolicy};
///
/// // The drop policy is set at pool creation time.
/// let pool = BlockPool::builder()
///     .block_size(64)
///     .pool_size(4)
///     .drop_policy(DropPolicy::MustBeEmpty)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool may be destroyed while blocks are still in use. This is the default.
    ///
    /// Any block address obtained via [`Block::into_raw()`][crate::Block::into_raw] becomes
    /// dangling when the pool is destroyed.
    #[default]
    MayLeakBlocks,

    /// The pool will panic if it still has blocks in use when it is destroyed.
    ///
    /// This may be valuable if blocks are handed out as raw addresses, with the expectation
    /// that every one of them is released back to the pool before the pool goes away.
    MustBeEmpty,
}
