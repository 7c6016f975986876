use std::alloc::{alloc_zeroed, dealloc};
use std::ptr::NonNull;

use crate::{Error, PoolLayout, ReleaseFault, Result};

/// The single contiguous allocation that is subdivided into the blocks of a pool.
///
/// # Out of band access
///
/// The store does not create or keep references to the memory blocks. Block contents are only
/// ever accessed through the [`Block`][crate::Block] handle that owns the block index, so it is
/// valid for handles to create references to their own block while the store is shared.
#[derive(Debug)]
pub(crate) struct BackingStore {
    /// Start of the allocation and of the block with index 0.
    base: NonNull<u8>,

    layout: PoolLayout,
}

impl BackingStore {
    /// Reserves zero-initialized memory for every block described by `layout`.
    ///
    /// Fails with [`Error::OutOfMemory`] if the global allocator cannot satisfy the request.
    pub(crate) fn new(layout: PoolLayout) -> Result<Self> {
        let backing_layout = layout.backing_layout();

        // SAFETY: The backing layout has a non-zero size because PoolLayout guarantees that
        // both the block size and the pool size are non-zero.
        let base = NonNull::new(unsafe { alloc_zeroed(backing_layout) }).ok_or(
            Error::OutOfMemory {
                purpose: "backing store",
                bytes: backing_layout.size(),
            },
        )?;

        Ok(Self { base, layout })
    }

    /// Total size of the store in bytes.
    pub(crate) fn len(&self) -> usize {
        self.layout.backing_layout().size()
    }

    /// Returns a pointer to the first byte of the block at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not the index of a block in the store.
    pub(crate) fn block_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(
            index < self.layout.pool_size().get(),
            "block {index} index out of bounds in pool of {} blocks",
            self.layout.pool_size()
        );

        // Cannot overflow because that would imply the store extends beyond virtual memory.
        let offset = index.wrapping_mul(self.layout.block_size().get());

        // SAFETY: The bounds check above guarantees that the offset lies within our allocation.
        unsafe { self.base.add(offset) }
    }

    /// Maps an address back to the index of the block that starts at that address.
    ///
    /// The address must point at the first byte of a block - an address in the middle of a
    /// block is rejected with [`ReleaseFault::Misaligned`] instead of being rounded down.
    pub(crate) fn index_of(&self, address: NonNull<u8>) -> std::result::Result<usize, ReleaseFault> {
        let address = address.addr().get();

        let offset = address
            .checked_sub(self.base.addr().get())
            .filter(|offset| *offset < self.len())
            .ok_or(ReleaseFault::OutOfRange { address })?;

        let block_size = self.layout.block_size();

        if offset.checked_rem(block_size.get()) != Some(0) {
            return Err(ReleaseFault::Misaligned {
                offset,
                block_size: block_size.get(),
            });
        }

        Ok(offset / block_size)
    }

    /// Whether `address` points anywhere into the store.
    pub(crate) fn contains(&self, address: *const u8) -> bool {
        address
            .addr()
            .checked_sub(self.base.addr().get())
            .is_some_and(|offset| offset < self.len())
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        // SAFETY: We allocated this memory in new() with the same layout and it has not yet
        // been deallocated - the store owns the allocation and is dropped exactly once.
        unsafe {
            dealloc(self.base.as_ptr(), self.layout.backing_layout());
        }
    }
}

// SAFETY: The store only holds a pointer to its own allocation and never reads or writes the
// memory it points to. Access to the contents of each block goes through the single Block
// handle that owns the block index, and the pool guarantees that each index has at most one owner.
unsafe impl Send for BackingStore {}

// SAFETY: See the Send implementation - shared access to the store only hands out pointers,
// computed from immutable fields.
unsafe impl Sync for BackingStore {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "test code doesn't need the same safety rigor as production code"
)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(BackingStore: Send, Sync);

    fn store(block_size: usize, pool_size: usize) -> BackingStore {
        BackingStore::new(PoolLayout::calculate(block_size, pool_size, None).unwrap()).unwrap()
    }

    #[test]
    fn starts_zeroed() {
        let store = store(16, 4);

        for index in 0..4 {
            let ptr = store.block_ptr(index);

            for byte in 0..16 {
                assert_eq!(unsafe { ptr.add(byte).read() }, 0);
            }
        }
    }

    #[test]
    fn block_ptrs_are_spaced_by_block_size() {
        let store = store(64, 4);

        let base = store.block_ptr(0).addr().get();

        for index in 0..4 {
            assert_eq!(store.block_ptr(index).addr().get() - base, index * 64);
        }
    }

    #[test]
    fn block_ptrs_are_aligned() {
        let store = store(48, 8);

        for index in 0..8 {
            assert_eq!(store.block_ptr(index).addr().get() % 16, 0);
        }
    }

    #[test]
    #[should_panic]
    fn block_ptr_out_of_bounds_panics() {
        let store = store(64, 4);

        _ = store.block_ptr(4);
    }

    #[test]
    fn index_of_maps_block_starts() {
        let store = store(64, 4);

        for index in 0..4 {
            assert_eq!(store.index_of(store.block_ptr(index)), Ok(index));
        }
    }

    #[test]
    fn index_of_rejects_mid_block_address() {
        let store = store(64, 4);

        let mid_block = unsafe { store.block_ptr(1).add(10) };

        assert_eq!(
            store.index_of(mid_block),
            Err(ReleaseFault::Misaligned {
                offset: 74,
                block_size: 64
            })
        );
    }

    #[test]
    fn index_of_rejects_foreign_address() {
        let store = store(64, 4);
        let mut local = 0_u8;
        let foreign = NonNull::from(&mut local);

        assert!(matches!(
            store.index_of(foreign),
            Err(ReleaseFault::OutOfRange { .. })
        ));
    }

    #[test]
    fn index_of_rejects_one_past_end() {
        let store = store(64, 4);

        let past_end = unsafe { store.block_ptr(3).add(64) };

        assert_eq!(
            store.index_of(past_end),
            Err(ReleaseFault::OutOfRange {
                address: past_end.addr().get()
            })
        );
    }

    #[test]
    fn contains_covers_exactly_the_store() {
        let store = store(64, 4);
        let first = store.block_ptr(0);

        assert!(store.contains(first.as_ptr()));
        assert!(store.contains(unsafe { first.add(255) }.as_ptr()));
        assert!(!store.contains(unsafe { first.add(256) }.as_ptr()));
        assert!(!store.contains(first.as_ptr().wrapping_sub(1)));
    }
}
