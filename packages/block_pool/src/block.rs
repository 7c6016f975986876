use std::marker::PhantomData;
use std::num::NonZero;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use crate::BlockPool;

/// Exclusive handle to one block of a [`BlockPool`], returned by
/// [`BlockPool::acquire_block()`].
///
/// The handle owns the block until it is given back via [`BlockPool::release_block()`], which
/// consumes the handle and thereby prevents any further use of the block through it. The handle
/// cannot be copied or cloned, so at most one handle exists for each block that is in use.
///
/// The handle borrows the pool it came from, which means the pool cannot be destroyed while the
/// handle is alive.
///
/// # Block contents
///
/// The handle dereferences to the bytes of the block (`[u8]`) for both reading and writing.
/// The pool does not clear blocks when they are released, so a newly acquired block may contain
/// data written by a previous owner. Use [`clear()`](Self::clear) if that matters.
///
/// # Dropping the handle
///
/// Dropping the handle without releasing it does not return the block to the pool - the block
/// remains in use until the pool is destroyed.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
///
/// let pool = BlockPool::new(64, 4).unwrap();
///
/// let mut block = pool.acquire_block().unwrap();
/// assert_eq!(block.len(), 64);
///
/// block[..5].copy_from_slice(b"hello");
/// assert_eq!(&block[..5], b"hello");
///
/// pool.release_block(block).unwrap();
/// ```
///
/// # Thread safety
///
/// The handle is thread-safe ([`Send`] + [`Sync`]): it can be moved to another thread, which
/// then owns the block, and shared references to it only permit reading the block contents.
#[derive(Debug)]
#[must_use = "a block that is dropped without being released stays in use until the pool is destroyed"]
pub struct Block<'pool> {
    /// Ensures this handle can only be returned to the pool it came from.
    pool_id: u64,

    index: usize,

    ptr: NonNull<u8>,

    size: NonZero<usize>,

    _pool: PhantomData<&'pool BlockPool>,
}

impl Block<'_> {
    #[inline]
    pub(crate) fn new(pool_id: u64, index: usize, ptr: NonNull<u8>, size: NonZero<usize>) -> Self {
        Self {
            pool_id,
            index,
            ptr,
            size,
            _pool: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// Index of the block within the pool.
    ///
    /// The block with index `i` starts at byte offset `i * block_size` of the pool's backing
    /// store.
    #[must_use]
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset of the block from the start of the pool's backing store.
    #[must_use]
    #[inline]
    pub fn offset(&self) -> usize {
        // Cannot overflow because the block lies within an allocation of at least this size.
        self.index.wrapping_mul(self.size.get())
    }

    /// Size of the block in bytes, equal to the block size of the pool.
    #[must_use]
    #[inline]
    pub fn size(&self) -> usize {
        self.size.get()
    }

    /// Returns a pointer to the first byte of the block.
    ///
    /// The pointer remains valid until the block is released or the pool is destroyed.
    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Returns the contents of the block.
    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: The pointer refers to `size` initialized (zero-filled at pool creation) bytes
        // within the pool's backing store. This handle is the only owner of the block and the
        // returned reference borrows the handle, so no conflicting mutable access can exist.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.size.get()) }
    }

    /// Returns the contents of the block for modification.
    #[must_use]
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: The pointer refers to `size` initialized bytes within the pool's backing store.
        // This handle is the only owner of the block and we hold an exclusive reference to it,
        // so the returned reference is the only reference to these bytes.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size.get()) }
    }

    /// Fills the block with zero bytes.
    pub fn clear(&mut self) {
        // SAFETY: The pointer is valid for writes of `size` bytes and exclusively owned by this
        // handle, which we hold an exclusive reference to.
        unsafe {
            ptr::write_bytes(self.ptr.as_ptr(), 0, self.size.get());
        }
    }

    /// Consumes the handle and returns a pointer to the first byte of the block.
    ///
    /// The block remains in use. The caller becomes responsible for any access to the block
    /// contents through the pointer and for eventually returning the block via
    /// [`BlockPool::release_address()`].
    #[must_use = "the returned address is needed to release the block"]
    #[inline]
    pub fn into_raw(self) -> NonNull<u8> {
        self.ptr
    }
}

impl Deref for Block<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for Block<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl AsRef<[u8]> for Block<'_> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for Block<'_> {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

// SAFETY: The handle is the only owner of its block and the pool it borrows is Sync, so moving
// the handle to another thread moves the exclusive right to access the block along with it.
unsafe impl Send for Block<'_> {}

// SAFETY: Shared references to the handle only permit reading the block contents, which is
// safe to do from multiple threads at once.
unsafe impl Sync for Block<'_> {}
