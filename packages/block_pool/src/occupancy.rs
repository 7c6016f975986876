use std::num::NonZero;

use crate::{AllocationStrategy, Error, ReleaseFault, Result};

/// Occupancy flag of a block that can be handed out.
const FREE: u8 = 0;

/// Occupancy flag of a block that has been handed out and not yet released.
const USED: u8 = 1;

/// Tracks which blocks of a pool are in use, one flag byte per block.
///
/// The flag at index `i` describes the block starting at byte offset `i * block_size` of the
/// backing store. The tracker itself is not synchronized - the pool keeps it behind its guard.
#[derive(Debug)]
pub(crate) struct Occupancy {
    /// One flag per block, either [`FREE`] or [`USED`].
    flags: Vec<u8>,

    /// Number of [`USED`] entries in `flags`, maintained incrementally so it can be read in O(1).
    used_blocks: usize,

    strategy: AllocationStrategy,

    /// Stack of free block indexes with the next block to hand out on top (at the end).
    ///
    /// Only maintained for [`AllocationStrategy::MostRecentlyReleased`] and empty otherwise.
    /// Capacity for every block is reserved up front, so pushing never allocates.
    free_stack: Vec<usize>,
}

impl Occupancy {
    /// Creates a tracker for `pool_size` blocks, all of them free.
    ///
    /// Fails with [`Error::OutOfMemory`] if the memory for the tracker cannot be reserved.
    pub(crate) fn new(pool_size: NonZero<usize>, strategy: AllocationStrategy) -> Result<Self> {
        let mut flags = Vec::new();
        flags
            .try_reserve_exact(pool_size.get())
            .map_err(|_reserve_error| Error::OutOfMemory {
                purpose: "occupancy map",
                bytes: pool_size.get(),
            })?;
        flags.resize(pool_size.get(), FREE);

        let mut free_stack = Vec::new();

        if strategy == AllocationStrategy::MostRecentlyReleased {
            free_stack
                .try_reserve_exact(pool_size.get())
                .map_err(|_reserve_error| Error::OutOfMemory {
                    purpose: "free block stack",
                    bytes: pool_size.get().saturating_mul(size_of::<usize>()),
                })?;

            // Never-used blocks are handed out in ascending index order, so the lowest index
            // has to be on top of the stack.
            free_stack.extend((0..pool_size.get()).rev());
        }

        Ok(Self {
            flags,
            used_blocks: 0,
            strategy,
            free_stack,
        })
    }

    /// Number of blocks currently marked as used.
    pub(crate) fn used_blocks(&self) -> usize {
        self.used_blocks
    }

    /// Whether the block at `index` is currently marked as used.
    pub(crate) fn is_used(&self, index: usize) -> bool {
        self.flags.get(index) == Some(&USED)
    }

    /// Marks a free block as used and returns its index, or `None` if every block is in use.
    ///
    /// When `None` is returned, the tracker is unchanged.
    pub(crate) fn acquire(&mut self) -> Option<usize> {
        let index = match self.strategy {
            AllocationStrategy::FirstFit => self.flags.iter().position(|flag| *flag == FREE)?,
            AllocationStrategy::MostRecentlyReleased => self.free_stack.pop()?,
        };

        let flag = self
            .flags
            .get_mut(index)
            .expect("free block indexes always refer to an existing occupancy flag");

        assert!(
            *flag == FREE,
            "acquire() selected block {index} which is already in use"
        );

        *flag = USED;

        // Cannot overflow because we only get here if at least one flag was free.
        self.used_blocks = self.used_blocks.wrapping_add(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        Some(index)
    }

    /// Marks a used block as free again.
    ///
    /// Releasing a block that is already free fails with [`ReleaseFault::AlreadyFree`] and
    /// leaves the tracker unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not the index of a block tracked by this instance.
    pub(crate) fn release(&mut self, index: usize) -> std::result::Result<(), ReleaseFault> {
        let capacity = self.flags.len();

        let Some(flag) = self.flags.get_mut(index) else {
            panic!("release({index}) is out of bounds for a pool of {capacity} blocks");
        };

        if *flag == FREE {
            return Err(ReleaseFault::AlreadyFree { index });
        }

        *flag = FREE;

        // Cannot underflow because the flag we just cleared was counted as used.
        self.used_blocks = self.used_blocks.wrapping_sub(1);

        if self.strategy == AllocationStrategy::MostRecentlyReleased {
            self.free_stack.push(index);
        }

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    /// Verifies that the used block counter and the free stack agree with the occupancy flags.
    ///
    /// This method is only available in debug builds and is used for testing and validation.
    pub(crate) fn integrity_check(&self) {
        let observed_used = self.flags.iter().filter(|flag| **flag == USED).count();

        assert!(
            self.used_blocks == observed_used,
            "used_blocks {} does not match the observed used count {} in a pool of {} blocks",
            self.used_blocks,
            observed_used,
            self.flags.len(),
        );

        assert!(
            self.flags.iter().all(|flag| *flag == FREE || *flag == USED),
            "occupancy map contains a flag that is neither free nor used"
        );

        if self.strategy != AllocationStrategy::MostRecentlyReleased {
            return;
        }

        assert!(
            self.free_stack.len() == self.flags.len().saturating_sub(observed_used),
            "free stack holds {} indexes but {} blocks are free",
            self.free_stack.len(),
            self.flags.len().saturating_sub(observed_used),
        );

        let mut seen = vec![false; self.flags.len()];

        for &index in &self.free_stack {
            assert!(
                self.flags.get(index) == Some(&FREE),
                "free stack refers to block {index} which is not free"
            );

            let seen_flag = seen
                .get_mut(index)
                .expect("index was verified to be in bounds above");

            assert!(!*seen_flag, "free stack refers to block {index} twice");

            *seen_flag = true;
        }
    }
}
