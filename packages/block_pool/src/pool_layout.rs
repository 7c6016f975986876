use std::alloc::Layout;
use std::num::NonZero;

use crate::{Error, Result};

/// Block alignment used when the caller does not specify one, unless the block size itself
/// only permits a smaller alignment.
pub(crate) const MAX_DEFAULT_BLOCK_ALIGN: usize = 16;

/// Validated geometry of a pool: how big each block is, how many there are and how the backing
/// store has to be allocated to hold all of them with every block start suitably aligned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PoolLayout {
    block_size: NonZero<usize>,
    pool_size: NonZero<usize>,

    /// Layout of the single allocation backing every block of the pool. The alignment of this
    /// layout is also the alignment of every block, as the block size is a multiple of it.
    backing_layout: Layout,
}

impl PoolLayout {
    /// Validates the requested geometry and calculates the backing store layout.
    ///
    /// If `block_align` is `None`, the largest power of two that divides the block size is used,
    /// capped at [`MAX_DEFAULT_BLOCK_ALIGN`].
    pub(crate) fn calculate(
        block_size: usize,
        pool_size: usize,
        block_align: Option<usize>,
    ) -> Result<Self> {
        let block_size = NonZero::new(block_size)
            .ok_or_else(|| invalid("block size must be greater than zero".to_string()))?;

        let pool_size = NonZero::new(pool_size)
            .ok_or_else(|| invalid("pool size must be greater than zero".to_string()))?;

        let block_align = match block_align {
            Some(block_align) => {
                if !block_align.is_power_of_two() {
                    return Err(invalid(format!(
                        "block alignment {block_align} is not a power of two"
                    )));
                }

                if block_size.get().checked_rem(block_align) != Some(0) {
                    return Err(invalid(format!(
                        "block size {block_size} is not a multiple of the block alignment {block_align}"
                    )));
                }

                block_align
            }
            None => 1_usize
                .checked_shl(block_size.trailing_zeros())
                .map_or(MAX_DEFAULT_BLOCK_ALIGN, |natural| {
                    natural.min(MAX_DEFAULT_BLOCK_ALIGN)
                }),
        };

        let total_size = block_size.checked_mul(pool_size).ok_or_else(|| {
            invalid(format!(
                "{pool_size} blocks of {block_size} bytes do not fit in the address space"
            ))
        })?;

        let backing_layout =
            Layout::from_size_align(total_size.get(), block_align).map_err(|layout_error| {
                invalid(format!(
                    "{pool_size} blocks of {block_size} bytes cannot be allocated: {layout_error}"
                ))
            })?;

        Ok(Self {
            block_size,
            pool_size,
            backing_layout,
        })
    }

    pub(crate) fn block_size(&self) -> NonZero<usize> {
        self.block_size
    }

    pub(crate) fn pool_size(&self) -> NonZero<usize> {
        self.pool_size
    }

    pub(crate) fn block_align(&self) -> usize {
        self.backing_layout.align()
    }

    pub(crate) fn backing_layout(&self) -> Layout {
        self.backing_layout
    }
}

fn invalid(problem: String) -> Error {
    Error::InvalidConfiguration { problem }
}
