use thiserror::Error;

/// Errors that can occur when creating or operating a [`BlockPool`][crate::BlockPool].
///
/// The variants fall into two groups that callers usually want to treat differently:
///
/// * Capacity problems ([`PoolExhausted`][Self::PoolExhausted],
///   [`OutOfMemory`][Self::OutOfMemory]) are a property of the workload and may go away if
///   the caller waits, sheds load or creates a larger pool.
/// * Caller errors ([`InvalidConfiguration`][Self::InvalidConfiguration],
///   [`InvalidRelease`][Self::InvalidRelease]) indicate a bug in the calling code.
///
/// None of the errors leave the pool in an inconsistent state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The pool could not be created because its configuration is invalid.
    #[error("invalid block pool configuration: {problem}")]
    InvalidConfiguration {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// The global allocator could not provide memory needed to create the pool.
    #[error("unable to reserve {bytes} bytes for the {purpose} of a block pool")]
    OutOfMemory {
        /// What the memory was needed for.
        purpose: &'static str,

        /// How many bytes were requested.
        bytes: usize,
    },

    /// Every block of the pool is already in use.
    ///
    /// This is a recoverable condition - the pool is unchanged and a later attempt may succeed
    /// once another caller releases a block.
    #[error("all {pool_size} blocks of the pool are in use")]
    PoolExhausted {
        /// The total number of blocks in the pool.
        pool_size: usize,
    },

    /// A block release was rejected because it did not refer to a block that is in use.
    #[error("invalid block release: {0}")]
    InvalidRelease(ReleaseFault),
}

impl Error {
    /// Whether the error indicates that the pool had no free block to hand out.
    #[must_use]
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Whether the error indicates a bug in the calling code, as opposed to a capacity problem.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. } | Self::InvalidRelease(_)
        )
    }
}

impl From<ReleaseFault> for Error {
    fn from(fault: ReleaseFault) -> Self {
        Self::InvalidRelease(fault)
    }
}

/// Describes why a block release was rejected.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum ReleaseFault {
    /// The address does not point into the backing store of the pool.
    #[error("address {address:#x} is outside the backing store of the pool")]
    OutOfRange {
        /// The rejected address.
        address: usize,
    },

    /// The address points into the backing store but not at the start of a block.
    #[error("offset {offset} is not a multiple of the block size {block_size}")]
    Misaligned {
        /// Byte offset of the rejected address from the start of the backing store.
        offset: usize,

        /// The block size of the pool.
        block_size: usize,
    },

    /// The block is not in use, typically because it has already been released.
    #[error("block {index} is not in use")]
    AlreadyFree {
        /// Index of the block that was released.
        index: usize,
    },

    /// The handle was issued by a different pool.
    #[error("block {index} was issued by a different pool")]
    ForeignBlock {
        /// Index of the block within the pool that issued it.
        index: usize,
    },
}

/// A specialized `Result` type for block pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
