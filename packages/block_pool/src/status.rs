use std::fmt;

/// Point-in-time snapshot of the usage of a [`BlockPool`][crate::BlockPool].
///
/// The snapshot is taken under the pool's lock, so the counters are consistent with each other
/// (`used_blocks + free_blocks == pool_size`), although they may be outdated by the time the
/// caller looks at them if other threads keep using the pool.
///
/// The [`Display`][fmt::Display] implementation renders a multi-line report intended for
/// humans. The format is not stable and not meant to be parsed.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
///
/// let pool = BlockPool::new(64, 4).unwrap();
/// let block = pool.acquire_block().unwrap();
///
/// let status = pool.status();
/// assert_eq!(status.used_blocks, 1);
/// assert_eq!(status.free_blocks, 3);
///
/// println!("{status}");
/// # pool.release_block(block).unwrap();
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub struct PoolStatus {
    /// Size of each block in bytes.
    pub block_size: usize,

    /// Total number of blocks in the pool.
    pub pool_size: usize,

    /// Number of blocks handed out and not yet released.
    pub used_blocks: usize,

    /// Number of blocks available for acquisition.
    pub free_blocks: usize,
}

impl PoolStatus {
    pub(crate) fn new(block_size: usize, pool_size: usize, used_blocks: usize) -> Self {
        debug_assert!(used_blocks <= pool_size);

        Self {
            block_size,
            pool_size,
            used_blocks,
            // Cannot underflow because a pool never has more blocks in use than it has blocks.
            free_blocks: pool_size.wrapping_sub(used_blocks),
        }
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Block pool status:")?;
        writeln!(f, "  Block size: {} bytes", self.block_size)?;
        writeln!(f, "  Pool size: {} blocks", self.pool_size)?;
        writeln!(f, "  Used blocks: {}", self.used_blocks)?;
        write!(f, "  Free blocks: {}", self.free_blocks)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn free_blocks_are_derived() {
        let status = PoolStatus::new(64, 4, 3);

        assert_eq!(status.free_blocks, 1);
    }

    #[test]
    fn display_lists_every_counter() {
        let status = PoolStatus::new(64, 4, 1);

        assert_eq!(
            status.to_string(),
            "Block pool status:\n  Block size: 64 bytes\n  Pool size: 4 blocks\n  Used blocks: 1\n  Free blocks: 3"
        );
    }
}
